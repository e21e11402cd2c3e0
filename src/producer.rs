use std::process::Stdio;
use std::time::Duration;

use http_types::Url;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crate::{Error, Result, YTDLP_SLOTS};

// fixed browser identity; some sites serve different (or no) streams to
// unknown clients
const USER_AGENT: &str =
  "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const REFERER: &str = "https://www.youtube.com/";

// how long a signalled producer gets before SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
  Running,
  ExitedOk,
  ExitedError(i32),
  Killed,
}

// one spawned yt-dlp process writing the requested stream to stdout. the
// owner is the only place that signals or reaps it.
pub struct Producer {
  child: Child,
  state: ProducerState,
  _permit: Option<OwnedSemaphorePermit>,
}

impl Producer {
  pub async fn spawn(url: &Url, format: &str) -> Result<Self> {
    let permit = YTDLP_SLOTS
      .clone()
      .acquire_owned()
      .await
      .expect("yt-dlp semaphore is never closed");

    let mut cmd = Command::new("yt-dlp");
    cmd
      .arg("--no-warnings")
      .arg("--no-call-home")
      .arg("--user-agent")
      .arg(USER_AGENT)
      .arg("--referer")
      .arg(REFERER)
      .arg("-f")
      .arg(format)
      .arg("--merge-output-format")
      .arg("mp4")
      .arg("-o")
      .arg("-")
      .arg(url.as_str());

    Self::spawn_command(cmd, Some(permit))
  }

  #[cfg(test)]
  pub(crate) fn spawn_stub(cmd: Command) -> Result<Self> {
    Self::spawn_command(cmd, None)
  }

  fn spawn_command(
    mut cmd: Command,
    permit: Option<OwnedSemaphorePermit>,
  ) -> Result<Self> {
    let child = cmd
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      // last-resort reaper; the regular paths terminate explicitly
      .kill_on_drop(true)
      .spawn()
      .map_err(Error::ProducerSpawn)?;

    debug!("producer spawned (pid {:?})", child.id());

    Ok(Self {
      child,
      state: ProducerState::Running,
      _permit: permit,
    })
  }

  pub fn take_stdout(&mut self) -> ChildStdout {
    self.child.stdout.take().expect("stdout requested at spawn")
  }

  pub fn take_stderr(&mut self) -> ChildStderr {
    self.child.stderr.take().expect("stderr requested at spawn")
  }

  pub fn state(&self) -> ProducerState {
    self.state
  }

  // reap the process. repeated calls return the recorded state.
  pub async fn wait(&mut self) -> ProducerState {
    if self.state != ProducerState::Running {
      return self.state;
    }

    self.state = match self.child.wait().await {
      Ok(status) if status.success() => ProducerState::ExitedOk,
      Ok(status) => ProducerState::ExitedError(status.code().unwrap_or(-1)),
      Err(e) => {
        warn!("failed waiting on producer: {e}");
        ProducerState::ExitedError(-1)
      }
    };

    self.state
  }

  // idempotent. sends SIGTERM, allows a grace period, escalates to SIGKILL.
  // an exit observed before the first terminate call stays authoritative.
  pub async fn terminate(&mut self) -> ProducerState {
    if self.state != ProducerState::Running {
      return self.state;
    }

    if let Some(pid) = self.child.id() {
      #[cfg(unix)]
      {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
          debug!("SIGTERM to producer {pid} failed: {e}");
        }
      }
      #[cfg(not(unix))]
      {
        let _ = self.child.start_kill();
      }
    }

    let graceful =
      tokio::time::timeout(KILL_GRACE, self.child.wait()).await.is_ok();
    if !graceful {
      warn!("producer ignored SIGTERM, killing");
      if let Err(e) = self.child.kill().await {
        warn!("failed to kill producer: {e}");
      }
    }

    self.state = ProducerState::Killed;
    self.state
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
  }

  #[tokio::test]
  async fn test_wait_records_exit_states() {
    let mut ok = Producer::spawn_stub(sh("exit 0")).unwrap();
    assert_eq!(ok.wait().await, ProducerState::ExitedOk);
    // repeated waits stay stable
    assert_eq!(ok.wait().await, ProducerState::ExitedOk);

    let mut failed = Producer::spawn_stub(sh("exit 3")).unwrap();
    assert_eq!(failed.wait().await, ProducerState::ExitedError(3));
  }

  #[tokio::test]
  async fn test_terminate_is_idempotent() {
    let mut producer = Producer::spawn_stub(sh("sleep 30")).unwrap();
    assert_eq!(producer.state(), ProducerState::Running);
    assert_eq!(producer.terminate().await, ProducerState::Killed);
    assert_eq!(producer.terminate().await, ProducerState::Killed);
  }

  #[tokio::test]
  async fn test_exit_before_terminate_stays_authoritative() {
    let mut producer = Producer::spawn_stub(sh("exit 7")).unwrap();
    assert_eq!(producer.wait().await, ProducerState::ExitedError(7));
    assert_eq!(producer.terminate().await, ProducerState::ExitedError(7));
  }

  #[tokio::test]
  async fn test_spawn_failure_is_reported() {
    let cmd = Command::new("/nonexistent/definitely-not-a-binary");
    match Producer::spawn_stub(cmd) {
      Err(Error::ProducerSpawn(_)) => {}
      Err(e) => panic!("unexpected error: {e}"),
      Ok(_) => panic!("spawn should have failed"),
    }
  }
}
