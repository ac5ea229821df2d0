//! Sequential execution of a compiled recipe.
use anyhow::{Context as _, Result};

use crate::config::Config;
use crate::logging::{Logger, StepStatus};
use crate::recipe;
use crate::steps::{Action, Environment, Step, StepResult};

/// Compile `config` and run every step in order.
///
/// The whole recipe is compiled before the first step runs.  The first
/// failing step stops the run; steps that already ran are not undone.  The
/// summary is printed in every case.
///
/// # Errors
///
/// Returns an error if the configuration does not compile or a step fails.
pub fn run(config: &Config, env: &Environment, log: &Logger) -> Result<()> {
    log.stage("Compiling recipe");
    let steps = recipe::compile(config, &env.base_dir)?;
    log.info(&format!("{} steps to run", steps.len()));
    if env.dry_run {
        log.info("dry run: no changes will be made");
    }

    let result = run_steps(&steps, env);
    log.print_summary();
    result
}

/// Run `steps` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first step error, annotated with the step description.
pub fn run_steps(steps: &[Step], env: &Environment) -> Result<()> {
    for step in steps {
        execute(step, env)?;
    }
    Ok(())
}

/// Run one step with a step-scoped logger and record its result.
///
/// # Errors
///
/// Returns the step's error, annotated with the step description.
pub fn execute(step: &Step, env: &Environment) -> Result<StepResult> {
    let description = step.description();
    env.log.stage(&description);

    let scoped = env.scoped(step.name());
    match step.run(&scoped) {
        Ok(result) => {
            match &result {
                StepResult::Ok => env.log.record_step(&description, StepStatus::Ok, None),
                StepResult::Skipped(reason) => {
                    env.log.info(&format!("skipped: {reason}"));
                    env.log
                        .record_step(&description, StepStatus::Skipped, Some(reason.as_str()));
                }
                StepResult::DryRun => {
                    env.log.record_step(&description, StepStatus::DryRun, None);
                }
            }
            Ok(result)
        }
        Err(e) => {
            env.log.error(&format!("{description}: {e:#}"));
            env.log
                .record_step(&description, StepStatus::Failed, Some(&format!("{e:#}")));
            Err(e).with_context(|| format!("step '{description}' failed"))
        }
    }
}
