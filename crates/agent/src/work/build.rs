// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build work: runs a build-command tree and reports its outcome.

use super::{BuildConsole, WorkContext};
use crate::artifacts::ConsoleSink;
use crate::error::WorkError;
use crate::runner::Work;
use dv_core::{AgentBuildingInfo, EnvironmentVariables, JobResult, JobState};
use dv_wire::{BuildCommand, BuildSettings, Report};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct BuildWork {
    settings: BuildSettings,
}

impl BuildWork {
    pub fn new(settings: BuildSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Run one step. Returns false when the step failed or the build was
    /// cancelled; the caller skips everything after it.
    fn run_command(&self, command: &BuildCommand, ctx: &WorkContext, console: &BuildConsole) -> bool {
        if ctx.cancel.is_cancelled() {
            return false;
        }
        match command {
            BuildCommand::Compose { commands } => {
                commands.iter().all(|c| self.run_command(c, ctx, console))
            }
            BuildCommand::Echo { line } => {
                console.console_line(line);
                true
            }
            BuildCommand::Exec { command, args, working_dir, env } => {
                let dir = match working_dir {
                    Some(dir) => ctx.working_dir.join(dir),
                    None => ctx.working_dir.clone(),
                };
                match exec(command, args, &dir, env, ctx, console) {
                    Ok(status) if status.success() => true,
                    Ok(status) => {
                        if !ctx.cancel.is_cancelled() {
                            console.console_line(&format!("[drover] '{}' exited with {}", command, status));
                        }
                        false
                    }
                    Err(e) => {
                        console.console_line(&format!("[drover] {}", e));
                        false
                    }
                }
            }
            BuildCommand::ReportCurrentStatus { state } => {
                let report = Report::status(ctx.snapshot(), &self.settings.build_id, *state);
                if let Err(e) = ctx.publisher.report_current_status(report) {
                    tracing::warn!(build_id = %self.settings.build_id, %state, error = %e, "status report failed");
                }
                true
            }
            BuildCommand::UploadArtifact { src, dest } => {
                let source = ctx.working_dir.join(src);
                if let Err(e) =
                    ctx.uploader.upload_blocking(console, &source, dest, &self.settings.build_id)
                {
                    tracing::warn!(build_id = %self.settings.build_id, %src, error = %e, "artifact not uploaded");
                }
                true
            }
        }
    }
}

impl Work for BuildWork {
    fn description(&self) -> String {
        format!("build {}", self.settings.build_locator_for_display)
    }

    fn do_work(&self, ctx: &WorkContext) -> Result<(), WorkError> {
        let settings = &self.settings;
        ctx.record.lock().busy(AgentBuildingInfo::new(
            &settings.build_locator_for_display,
            &settings.build_locator,
        ));
        tracing::info!(build = %settings.build_locator_for_display, "build started");

        let building = Report::status(ctx.snapshot(), &settings.build_id, JobState::Building);
        if let Err(e) = ctx.publisher.report_current_status(building) {
            ctx.record.lock().idle();
            return Err(e.into());
        }

        let console = BuildConsole::new(ctx.publisher.clone(), &settings.build_id);
        let passed = self.run_command(&settings.build_command, ctx, &console);
        let result = if ctx.cancel.is_cancelled() {
            JobResult::Cancelled
        } else if passed {
            JobResult::Passed
        } else {
            JobResult::Failed
        };

        let completed = Report::completed(ctx.snapshot(), &settings.build_id, result);
        let reported = ctx.publisher.report_completed(completed);
        ctx.record.lock().idle();
        tracing::info!(build = %settings.build_locator_for_display, %result, "build finished");
        reported.map_err(WorkError::from)
    }
}

/// Run a subprocess, streaming its output to `console` and killing it once
/// the cancel flag is raised.
fn exec(
    command: &str,
    args: &[String],
    dir: &Path,
    env: &EnvironmentVariables,
    ctx: &WorkContext,
    console: &BuildConsole,
) -> Result<ExitStatus, WorkError> {
    let mut child = Command::new(command)
        .args(args)
        .current_dir(dir)
        .envs(env.to_pairs())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| WorkError::Spawn { command: command.to_string(), source })?;

    let pid = child.id();
    let description = std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    ctx.subprocesses.register(pid, &description);
    tracing::debug!(pid, command = %description, "subprocess started");

    let readers: Vec<_> = [
        child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
        child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
    ]
    .into_iter()
    .flatten()
    .map(|stream| {
        let console = console.clone();
        std::thread::spawn(move || {
            for line in BufReader::new(stream).lines().map_while(Result::ok) {
                console.console_line(&line);
            }
        })
    })
    .collect();

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if ctx.cancel.is_cancelled() {
            tracing::info!(pid, command = %description, "killing subprocess");
            // Already-exited children report an error here; wait() below
            // still reaps them.
            let _ = child.kill();
            break child.wait()?;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    for reader in readers {
        let _ = reader.join();
    }
    ctx.subprocesses.unregister(pid);
    Ok(status)
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
