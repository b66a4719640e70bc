use std::time::Instant;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::command::{Execution, Status};
use crate::context::ExecutionContext;
use crate::error::PorterError;
use crate::pipeline::Pipeline;
use crate::report::{CommandReport, RunReport};

/// Sequential topological executor.
///
/// Walks the pipeline's linearization exactly once: a command is invoked
/// only after every dependency has terminated, dependents of anything
/// non-OK are SKIPPED without being invoked, and a failing action never
/// unwinds the walk; only its transitive dependents are affected. The run
/// always completes and always leaves a report on disk, even when every
/// command failed. The one exception is invalid user input (malformed
/// dataloader samples), which is a usage mistake: it is recorded, the
/// report is persisted, and the error is raised to the caller immediately.
pub struct Executor;

impl Executor {
    pub fn run(pipeline: &mut Pipeline, ctx: &ExecutionContext) -> Result<RunReport> {
        let order = pipeline.execution_order()?;
        let mut report = RunReport::new(&ctx.config.model_name, pipeline.framework);
        info!(
            pipeline = %pipeline.name,
            commands = pipeline.len(),
            "pipeline run started"
        );

        for id in order {
            let blocked = {
                let command = pipeline.get(id);
                command
                    .requires
                    .iter()
                    .find(|&&dep| pipeline.get(dep).status() != Status::Ok)
                    .map(|&dep| pipeline.get(dep).name.clone())
            };

            let mut user_error: Option<anyhow::Error> = None;
            let (status, output, error_text, duration_ms) = match blocked {
                Some(dep_name) => {
                    warn!(
                        command = %pipeline.get(id).name,
                        dependency = %dep_name,
                        "skipping: required command did not succeed"
                    );
                    (Status::Skipped, None, None, None)
                }
                None => {
                    let command = pipeline.get(id);
                    info!(command = %command.name, "started");
                    let started = Instant::now();
                    let outcome = command.invoke(ctx);
                    let elapsed = started.elapsed().as_millis() as u64;
                    match outcome {
                        Ok(Execution::Completed(output)) => {
                            (Status::Ok, output, None, Some(elapsed))
                        }
                        Ok(Execution::Skipped(reason)) => {
                            warn!(command = %command.name, reason = %reason, "skipped");
                            (Status::Skipped, None, Some(reason), Some(elapsed))
                        }
                        Ok(Execution::Noop) => (Status::Noop, None, None, Some(elapsed)),
                        Err(err) => {
                            error!(command = %command.name, err = %format!("{err:#}"), "failed");
                            let text = format!("{err:#}");
                            if matches!(
                                err.downcast_ref::<PorterError>(),
                                Some(PorterError::UserInput(_))
                            ) {
                                user_error = Some(err);
                            }
                            (Status::Fail, None, Some(text), Some(elapsed))
                        }
                    }
                }
            };

            let command = pipeline.get_mut(id);
            command.finish(status, output.clone());
            report.record(CommandReport {
                name: command.name.clone(),
                kind: command.kind,
                status,
                target_format: command.target_format,
                output,
                duration_ms,
                error: error_text,
                requested: command.requested,
            });

            // Persist after every terminal transition so an externally
            // killed run still leaves the statuses reached so far.
            if let Err(err) = report.save(ctx.workdir()) {
                warn!(err = %format!("{err:#}"), "failed to persist run report");
            }

            if let Some(err) = user_error {
                report.save(ctx.workdir())?;
                return Err(err);
            }
        }

        report.save(ctx.workdir())?;
        info!(
            pipeline = %pipeline.name,
            failures = report.requested_failures(),
            "pipeline run finished"
        );
        Ok(report)
    }
}
