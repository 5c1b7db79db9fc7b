//! Line-oriented console the desktop client talks through. The locked loop
//! only returns once the exit gate has let the student out.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, Lines};
use tracing::warn;
use zeroize::Zeroizing;

use crate::lockdown::{ExitDecision, ExitGate, LockdownEnforcer};

/// Pause before reading again after the console closed or failed.
pub const INPUT_RETRY: Duration = Duration::from_millis(250);

#[async_trait]
pub trait LineSource: Send {
    /// `Ok(None)` once the input is closed.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;
}

#[async_trait]
impl<R> LineSource for Lines<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        Lines::next_line(self).await
    }
}

fn show_prompt(label: &str) {
    print!("{}: ", label);
    if let Err(e) = std::io::stdout().flush() {
        warn!(error = %e, "flushing stdout failed");
    }
}

/// Reads one trimmed answer. `None` when the input is closed or failed.
pub async fn prompt<S: LineSource + ?Sized>(input: &mut S, label: &str) -> Option<String> {
    show_prompt(label);
    match input.next_line().await {
        Ok(Some(line)) => Some(line.trim().to_string()),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "reading input failed");
            None
        }
    }
}

/// Asks until a non-blank answer arrives. `None` when the input is closed.
pub async fn prompt_required<S: LineSource + ?Sized>(input: &mut S, label: &str) -> Option<String> {
    loop {
        let answer = prompt(input, label).await?;
        if !answer.is_empty() {
            return Some(answer);
        }
        println!("{} is required.", label);
    }
}

/// Next command line while locked. A closed or failing console never ends
/// the exam; it is read again after `INPUT_RETRY`.
async fn next_locked_line<S: LineSource + ?Sized>(input: &mut S) -> String {
    let mut reported = false;
    loop {
        match input.next_line().await {
            Ok(Some(line)) => return line,
            Ok(None) if !reported => warn!("console input closed, exam stays locked"),
            Err(e) if !reported => warn!(error = %e, "reading input failed, exam stays locked"),
            _ => {}
        }
        reported = true;
        tokio::time::sleep(INPUT_RETRY).await;
    }
}

/// Runs the locked console until the exit gate allows leaving. `status`
/// calls `show_status`; `exit` suspends enforcement and asks for the
/// teacher password, where no answer counts as a wrong one.
pub async fn run_locked<S, F, Fut>(
    input: &mut S,
    gate: &ExitGate,
    enforcer: &LockdownEnforcer,
    mut show_status: F,
) -> ExitDecision
where
    S: LineSource + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let line = next_locked_line(input).await;
        match line.trim() {
            "status" => show_status().await,
            "exit" => {
                let _suspended = enforcer.suspend();
                if !gate.is_protected() {
                    return ExitDecision::Allowed;
                }
                let attempt = Zeroizing::new(
                    prompt(input, "Teacher password").await.unwrap_or_default(),
                );
                match gate.check(&attempt) {
                    ExitDecision::Allowed => return ExitDecision::Allowed,
                    ExitDecision::WrongPassword => {
                        println!("Wrong password, the exam stays locked.")
                    }
                }
            }
            _ => {}
        }
    }
}
