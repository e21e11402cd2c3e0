use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::{debug, warn};

use crate::producer::ProducerState;
use crate::session::StreamSession;
use crate::{Error, Result};

// forwards producer stdout into the response body chunk by chunk. stops as
// soon as the session latch is set; once stdout runs dry the producer's
// terminal state decides between a clean close and an abort.
pub struct BridgeStream {
  session: Arc<StreamSession>,
  stdout: ReaderStream<ChildStdout>,
  exit: oneshot::Receiver<ProducerState>,
  halted: Pin<Box<WaitForCancellationFutureOwned>>,
  done: bool,
}

impl BridgeStream {
  pub fn new(
    session: Arc<StreamSession>,
    stdout: ChildStdout,
    exit: oneshot::Receiver<ProducerState>,
  ) -> Self {
    let halted = Box::pin(session.token().cancelled_owned());
    Self {
      session,
      stdout: ReaderStream::new(stdout),
      exit,
      halted,
      done: false,
    }
  }
}

impl Stream for BridgeStream {
  type Item = Result<Bytes>;

  fn poll_next(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
  ) -> Poll<Option<Self::Item>> {
    let this = &mut *self;

    if this.done {
      return Poll::Ready(None);
    }

    match Pin::new(&mut this.stdout).poll_next(cx) {
      Poll::Ready(Some(Ok(bytes))) => {
        // output that raced a termination trigger is discarded, not sent
        if this.session.is_terminated() {
          this.done = true;
          return Poll::Ready(None);
        }
        Poll::Ready(Some(Ok(bytes)))
      }
      Poll::Ready(Some(Err(e))) => {
        this.done = true;
        Poll::Ready(Some(Err(e.into())))
      }
      Poll::Ready(None) => {
        // stdout ran dry; the terminal state decides how the body ends. a
        // Killed state means another trigger already won, so the exit code
        // is redundant and the body just closes.
        match Pin::new(&mut this.exit).poll(cx) {
          Poll::Ready(Ok(ProducerState::ExitedError(code))) => {
            this.done = true;
            Poll::Ready(Some(Err(Error::ProducerExit(code))))
          }
          Poll::Ready(_) => {
            this.done = true;
            Poll::Ready(None)
          }
          Poll::Pending => Poll::Pending,
        }
      }
      Poll::Pending => {
        // wake on termination too, or a disconnect would leave this parked
        // until the next producer write
        if this.halted.as_mut().poll(cx).is_ready() {
          this.done = true;
          return Poll::Ready(None);
        }
        Poll::Pending
      }
    }
  }
}

// hyper drops the body on client disconnect and on normal completion alike;
// the latch must close in both cases
impl Drop for BridgeStream {
  fn drop(&mut self) {
    if self.session.terminate() {
      debug!("response body dropped mid-stream, session terminated");
    }
  }
}

// producer stderr is diagnostics only and never reaches the client
pub fn spawn_stderr_logger(stderr: ChildStderr) {
  tokio::spawn(async move {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
      if line.contains("ERROR:") {
        warn!("yt-dlp: {line}");
      } else {
        debug!("yt-dlp: {line}");
      }
    }
  });
}
