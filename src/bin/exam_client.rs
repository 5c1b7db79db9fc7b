use std::time::Duration;

use anyhow::Context;
use exam_lockdown::client::console::{prompt, prompt_required, run_locked, LineSource};
use exam_lockdown::client::{ExamApiClient, LaunchCredentials};
use exam_lockdown::config::ClientConfig;
use exam_lockdown::error::Error;
use exam_lockdown::lockdown::platform::{default_probe, default_shell};
use exam_lockdown::lockdown::{ExitGate, LockdownEnforcer, PostureChecker, ViolationMonitor};
use exam_lockdown::models::exam::ExamInfo;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use zeroize::Zeroizing;

const SUBMIT_ATTEMPTS: u32 = 3;

async fn submit_with_retries(api: &ExamApiClient, attempt_id: Uuid) -> bool {
    for attempt in 1..=SUBMIT_ATTEMPTS {
        match api.submit(attempt_id).await {
            Ok(response) if response.success => {
                info!(%attempt_id, "attempt submitted");
                return true;
            }
            Ok(response) => warn!(%attempt_id, error = ?response.error, "submit refused"),
            Err(e) => warn!(%attempt_id, attempt, error = %e, "submit failed"),
        }
        tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
    }
    false
}

/// Message shown for errors the student can fix by trying again.
fn inline_error(e: &Error) -> Option<String> {
    match e {
        Error::BadRequest(msg)
        | Error::Unauthorized(msg)
        | Error::Forbidden(msg)
        | Error::NotFound(msg) => Some(msg.clone()),
        Error::Validation(errors) => Some(errors.to_string()),
        Error::TooManyRequests => Some("Too many attempts. Try again shortly.".to_string()),
        _ => None,
    }
}

/// Runs the posture check until the machine may launch. Every failed
/// check is shown and can be re-run after the student fixes it.
async fn wait_for_clean_posture(
    posture: &PostureChecker,
    input: &mut dyn LineSource,
) -> anyhow::Result<()> {
    loop {
        let report = {
            let posture = posture.clone();
            tokio::task::spawn_blocking(move || posture.check()).await?
        };
        for warning in report.warnings() {
            println!("warning: {}", warning);
        }
        if report.can_launch() {
            return Ok(());
        }
        for reason in report.blocking_reasons() {
            println!("blocked: {}", reason);
        }
        prompt(input, "Press Enter to check again")
            .await
            .context("input closed before the machine passed the security check")?;
    }
}

async fn sign_in(api: &ExamApiClient, input: &mut dyn LineSource) -> anyhow::Result<()> {
    loop {
        let email = prompt_required(input, "Email").await.context("input closed")?;
        let password = Zeroizing::new(
            prompt_required(input, "Password").await.context("input closed")?,
        );
        match api.login(&email, &password, false).await {
            Ok(()) => return Ok(()),
            Err(e) => match inline_error(&e) {
                Some(msg) => println!("{}", msg),
                None => return Err(e.into()),
            },
        }
    }
}

async fn choose_exam(api: &ExamApiClient, input: &mut dyn LineSource) -> anyhow::Result<(String, ExamInfo)> {
    loop {
        let code = prompt_required(input, "Exam code").await.context("input closed")?;
        match api.get_exam(&code).await {
            Ok(response) => match response.exam {
                Some(exam) => return Ok((code, exam)),
                None => println!(
                    "{}",
                    response.error.unwrap_or_else(|| "Exam code was not accepted.".to_string())
                ),
            },
            Err(e) => match inline_error(&e) {
                Some(msg) => println!("{}", msg),
                None => return Err(e.into()),
            },
        }
    }
}

/// Asks for the teacher password until the server authorizes the code.
/// Returns the authorization token and the gate guarding exit.
async fn authorize(
    api: &ExamApiClient,
    input: &mut dyn LineSource,
    code: &str,
) -> anyhow::Result<(String, ExitGate)> {
    loop {
        let teacher_password = Zeroizing::new(
            prompt_required(input, "Teacher password")
                .await
                .context("input closed")?,
        );
        match api.authorize(code, &teacher_password).await {
            Ok(response) => match response.authorization_token.filter(|_| response.success) {
                Some(token) => return Ok((token, ExitGate::new(Some(teacher_password.as_str())))),
                None => println!(
                    "{}",
                    response.error.unwrap_or_else(|| "Authorization failed.".to_string())
                ),
            },
            Err(e) => match inline_error(&e) {
                Some(msg) => println!("{}", msg),
                None => return Err(e.into()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // A panic in a task must not leave the desktop locked without a trace.
    std::panic::set_hook(Box::new(|panic| {
        error!(%panic, "client panicked");
    }));

    let config = ClientConfig::from_env()?;
    let api = ExamApiClient::new(&config)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let posture = PostureChecker::new(default_probe());
    wait_for_clean_posture(&posture, &mut input).await?;
    sign_in(&api, &mut input).await?;

    let (code, exam) = choose_exam(&api, &mut input).await?;
    println!(
        "{} ({}) by {}, {} minutes",
        exam.exam_title, exam.course_name, exam.teacher_name, exam.duration_minutes
    );
    let (authorization_token, gate) = authorize(&api, &mut input, &code).await?;

    let started = api.start(&authorization_token).await?;
    let Some(launch) = LaunchCredentials::from_start(&started) else {
        anyhow::bail!(started.error.unwrap_or_else(|| "exam could not be started".to_string()));
    };
    info!(attempt_id = %launch.attempt_id, "exam started");

    let (violations, mut monitor) = ViolationMonitor::channel();
    let enforcer = LockdownEnforcer::new(
        default_shell()?,
        posture,
        config.monitor_interval,
        violations,
    );
    enforcer.enter();

    let reporter = {
        let api = api.clone();
        let launch = launch.clone();
        tokio::spawn(async move {
            while let Some((violation, count)) = monitor.next().await {
                println!("!! {} ({} so far)", violation.detail, count);
                if let Err(e) = api.report_violation(&launch, &violation).await {
                    warn!(error = %e, "violation report not delivered");
                }
            }
        })
    };

    println!("Exam is locked. Type `status` for time left or `exit` to finish.");
    let (api_ref, launch_ref) = (&api, &launch);
    run_locked(&mut input, &gate, &enforcer, move || async move {
        match api_ref.session_status(launch_ref).await {
            Ok(status) => println!(
                "{}: {} seconds left, {} violations",
                status.status, status.remaining_seconds, status.violation_count
            ),
            Err(e) => println!("session check failed: {}", e),
        }
    })
    .await;

    match api.session_status(&launch).await {
        Ok(status) if status.valid => {}
        Ok(status) => warn!(status = %status.status, "launch session no longer valid"),
        Err(e) => warn!(error = %e, "final session check failed"),
    }
    if !submit_with_retries(&api, launch.attempt_id).await {
        error!(attempt_id = %launch.attempt_id, "attempt could not be submitted");
    }

    enforcer.exit().await;
    reporter.abort();
    if let Err(e) = api.logout().await {
        warn!(error = %e, "logout failed");
    }
    Ok(())
}
