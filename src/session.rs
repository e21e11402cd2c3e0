use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::producer::{Producer, ProducerState};

// hard ceiling on a single download, kept under the 300s limit a typical
// fronting platform enforces so cleanup still has room to run
pub const STREAM_DEADLINE: Duration = Duration::from_secs(270);

// per-request latch shared by the bridge and the monitor. the transition to
// terminated happens at most once no matter how many triggers race it.
pub struct StreamSession {
  terminated: AtomicBool,
  cancel: CancellationToken,
}

impl StreamSession {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      terminated: AtomicBool::new(false),
      cancel: CancellationToken::new(),
    })
  }

  // set the latch. returns whether this call took the transition.
  pub fn terminate(&self) -> bool {
    let won = self
      .terminated
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_ok();
    if won {
      self.cancel.cancel();
    }
    won
  }

  pub fn is_terminated(&self) -> bool {
    self.terminated.load(Ordering::SeqCst)
  }

  pub fn token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  pub async fn cancelled(&self) {
    self.cancel.cancelled().await;
  }
}

// which of the three independent trigger sources ended the streaming phase
enum Trigger {
  ClientGone,
  ProducerDone(ProducerState),
  DeadlineExpired,
}

// single decision point per request: waits for the first trigger, stops the
// producer at most once, and reports the terminal state to the bridge.
pub fn spawn_monitor(
  session: Arc<StreamSession>,
  mut producer: Producer,
  exit_tx: oneshot::Sender<ProducerState>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let deadline = Instant::now() + STREAM_DEADLINE;

    let trigger = tokio::select! {
      _ = session.cancelled() => Trigger::ClientGone,
      state = producer.wait() => Trigger::ProducerDone(state),
      _ = sleep_until(deadline) => Trigger::DeadlineExpired,
    };

    match trigger {
      // natural exit: the bridge gets the state first so it can drain the
      // pipe tail; the latch closes with the response body
      Trigger::ProducerDone(state) => {
        debug!("producer finished: {state:?}");
        let _ = exit_tx.send(state);
        // the body may still be draining; keep the deadline armed until
        // the session closes
        tokio::select! {
          _ = session.cancelled() => {}
          _ = sleep_until(deadline) => {
            session.terminate();
          }
        }
      }
      // latch already set by whoever noticed the client was gone
      Trigger::ClientGone => {
        let state = producer.terminate().await;
        debug!("client went away, producer stopped: {state:?}");
        let _ = exit_tx.send(state);
      }
      Trigger::DeadlineExpired => {
        session.terminate();
        let state = producer.terminate().await;
        debug!("deadline expired, producer stopped: {state:?}");
        let _ = exit_tx.send(state);
      }
    }
  })
}

#[cfg(test)]
mod test {
  use super::*;
  use tokio::process::Command;

  fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
  }

  #[tokio::test]
  async fn test_latch_wins_exactly_once() {
    let session = StreamSession::new();

    let mut tasks = Vec::new();
    for _ in 0..16 {
      let session = session.clone();
      tasks.push(tokio::spawn(async move { session.terminate() }));
    }

    let mut wins = 0;
    for task in tasks {
      if task.await.unwrap() {
        wins += 1;
      }
    }

    assert_eq!(wins, 1);
    assert!(session.is_terminated());
  }

  #[tokio::test]
  async fn test_monitor_reports_clean_exit() {
    let producer = Producer::spawn_stub(sh("exit 0")).unwrap();
    let session = StreamSession::new();
    let (tx, rx) = oneshot::channel();
    spawn_monitor(session.clone(), producer, tx);

    assert_eq!(rx.await.unwrap(), ProducerState::ExitedOk);
    // the latch is left to the response teardown on this path
    assert!(!session.is_terminated());
  }

  #[tokio::test]
  async fn test_monitor_kills_producer_on_client_disconnect() {
    let producer = Producer::spawn_stub(sh("sleep 30")).unwrap();
    let session = StreamSession::new();
    let (tx, rx) = oneshot::channel();
    let monitor = spawn_monitor(session.clone(), producer, tx);

    session.terminate();

    let state = tokio::time::timeout(Duration::from_secs(10), rx)
      .await
      .expect("monitor should react promptly")
      .unwrap();
    assert_eq!(state, ProducerState::Killed);
    monitor.await.unwrap();
  }

  #[tokio::test(start_paused = true)]
  async fn test_monitor_enforces_deadline() {
    let producer = Producer::spawn_stub(sh("sleep 30")).unwrap();
    let session = StreamSession::new();
    let (tx, rx) = oneshot::channel();
    spawn_monitor(session.clone(), producer, tx);

    assert_eq!(rx.await.unwrap(), ProducerState::Killed);
    assert!(session.is_terminated());
  }
}
