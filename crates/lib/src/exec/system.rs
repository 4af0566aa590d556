//! Process-spawning [`CommandRunner`].

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandError, CommandOutput, CommandRunner, Invocation};

/// Runs invocations as real child processes.
///
/// Output is logged line by line while the child runs and is also captured
/// for the result. The child is killed if the future awaiting it is dropped,
/// so cancelling the surrounding task aborts an in-flight build or clone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
  async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CommandError> {
    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .current_dir(&invocation.cwd)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    if let Some(env) = &invocation.env {
      command.env_clear().envs(env);
    }

    debug!(
      command = %invocation.display(),
      cwd = %invocation.cwd.display(),
      env_vars = invocation.env.as_ref().map(|e| e.len()),
      "spawning process"
    );

    let spawn_error = |source: std::io::Error| CommandError::Spawn {
      program: invocation.program.clone(),
      source,
    };
    let mut child = command.spawn().map_err(spawn_error)?;

    let (stdout, stderr, status) = tokio::join!(
      forward(child.stdout.take(), "stdout", invocation.echo),
      forward(child.stderr.take(), "stderr", invocation.echo),
      child.wait(),
    );
    let status = status.map_err(spawn_error)?;

    if !status.success() {
      return Err(CommandError::Failed {
        command: invocation.display(),
        code: status.code(),
        stderr,
      });
    }

    Ok(CommandOutput { stdout, stderr })
  }
}

/// Log each line of `pipe` as it arrives and return everything read.
/// Invalid UTF-8 is replaced rather than ending the stream.
async fn forward<R: AsyncRead + Unpin>(pipe: Option<R>, stream: &'static str, echo: bool) -> String {
  let Some(pipe) = pipe else {
    return String::new();
  };

  let mut segments = BufReader::new(pipe).split(b'\n');
  let mut captured = String::new();
  loop {
    match segments.next_segment().await {
      Ok(Some(bytes)) => {
        let line = String::from_utf8_lossy(&bytes);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if echo {
          info!(stream, "{line}");
        } else {
          debug!(stream, "{line}");
        }
        captured.push_str(line);
        captured.push('\n');
      }
      Ok(None) => break,
      Err(e) => {
        debug!(stream, error = %e, "failed to read command output");
        break;
      }
    }
  }
  captured
}

/// Get the shell command and arguments used to run a command string.
///
/// # Arguments
///
/// * `override_shell` - Optional shell override from the build configuration
///
/// # Returns
///
/// A tuple of (shell_command, shell_arguments); the command string is passed
/// as the final argument.
pub fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      // Assume Unix-style shell (bash, sh, zsh, etc.)
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
