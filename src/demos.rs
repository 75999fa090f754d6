use clap::ValueEnum;
use serde_json::json;

use stepwise_core::error::{BoxError, Result};
use stepwise_core::types::ControlSignal;
use stepwise_engine::{step_fn, sync_step_fn, StepDef, StepOutcome, Workflow};

/// Built-in workflows runnable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Count `n` down to zero by repeating one step
    Countdown,
    /// Restart from the top until a flaky fetch succeeds
    Retry,
    /// Draft, send back for rework, then publish or abandon
    Review,
}

impl Demo {
    pub fn build(self) -> Result<Workflow> {
        match self {
            Self::Countdown => countdown(),
            Self::Retry => retry(),
            Self::Review => review(),
        }
    }
}

fn countdown() -> Result<Workflow> {
    Workflow::builder("countdown")
        .schema(json!({
            "type": "object",
            "properties": {
                "n": {"type": "integer", "minimum": 0, "default": 5}
            }
        }))
        .add_step_def(
            StepDef::new(
                "tick",
                sync_step_fn(|state, _| {
                    let n = state.get_i64("n").unwrap_or(0);
                    if n <= 0 {
                        return Ok(StepOutcome::next());
                    }
                    let mut ticks = state.get_as::<Vec<i64>>("ticks")?.unwrap_or_default();
                    ticks.push(n);
                    state.set("ticks", json!(ticks));
                    state.set("n", json!(n - 1));
                    Ok(StepOutcome::repeat())
                }),
            )
            .with_description("decrement n, repeating until it reaches zero"),
        )?
        .add_sync_step("liftoff", |state, _| {
            state.set_str("status", "liftoff");
            Ok(StepOutcome::end())
        })?
        .build()
}

fn retry() -> Result<Workflow> {
    Workflow::builder("retry")
        .schema(json!({
            "type": "object",
            "properties": {
                "succeed_after": {"type": "integer", "minimum": 1, "default": 3}
            }
        }))
        .output_schema(json!({
            "type": "object",
            "required": ["payload", "attempts"]
        }))
        .add_step_def(
            StepDef::new(
                "prepare",
                sync_step_fn(|state, _| {
                    let attempts = state.get_i64("attempts").unwrap_or(0);
                    state.set("attempts", json!(attempts));
                    Ok(StepOutcome::next())
                }),
            )
            .with_description("initialise the attempt counter"),
        )?
        .add_step_def(
            StepDef::new(
                "fetch",
                step_fn(|state, ctx| {
                    Box::pin(async move {
                        ctx.check_cancelled()?;
                        let attempts = state.get_i64("attempts").unwrap_or(0) + 1;
                        state.set("attempts", json!(attempts));
                        let succeed_after = state.get_i64("succeed_after").unwrap_or(1);
                        if attempts < succeed_after {
                            ctx.emit("fetch_failed", json!({"attempt": attempts})).await;
                            return Ok::<_, BoxError>(StepOutcome::restart());
                        }
                        Ok(StepOutcome::next()
                            .with_output(json!({"payload": format!("fetched on attempt {attempts}")})))
                    })
                }),
            )
            .with_description("fail until the configured attempt, restarting the run")
            .with_output_schema(json!({
                "type": "object",
                "required": ["payload"],
                "properties": {"payload": {"type": "string"}}
            })),
        )?
        .add_sync_step("store", |state, _| {
            state.set("stored", json!(true));
            Ok(StepOutcome::next())
        })?
        .build()
}

fn review() -> Result<Workflow> {
    Workflow::builder("review")
        .schema(json!({
            "type": "object",
            "properties": {
                "topic": {"type": "string", "default": "workflows"},
                "reject": {"type": "boolean", "default": false},
                "min_revisions": {"type": "integer", "minimum": 1, "default": 2}
            }
        }))
        .output_schema(json!({
            "type": "object",
            "required": ["status"],
            "properties": {"status": {"enum": ["published", "abandoned"]}}
        }))
        .add_sync_step("draft", |state, _| {
            let revision = state.get_i64("revision").unwrap_or(0) + 1;
            let topic = state.get_str("topic").unwrap_or("untitled").to_string();
            state.set("revision", json!(revision));
            state.set_str("draft", format!("{topic} (revision {revision})"));
            Ok(StepOutcome::next())
        })?
        .add_sync_step("review", |state, _| {
            if state.get("reject") == Some(&json!(true)) {
                return Ok(StepOutcome::goto("abandon"));
            }
            let revision = state.get_i64("revision").unwrap_or(0);
            let min_revisions = state.get_i64("min_revisions").unwrap_or(1);
            if revision < min_revisions {
                return Ok(StepOutcome::signal(ControlSignal::Prev));
            }
            Ok(StepOutcome::next())
        })?
        .add_sync_step("publish", |state, _| {
            state.set_str("status", "published");
            Ok(StepOutcome::end())
        })?
        .add_sync_step("abandon", |state, _| {
            state.set_str("status", "abandoned");
            Ok(StepOutcome::end())
        })?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_countdown() {
        let out = Demo::Countdown.build().unwrap().run(json!({"n": 3})).await.unwrap();
        assert_eq!(out.state.get("ticks"), Some(&json!([3, 2, 1])));
        assert_eq!(out.state.get_str("status"), Some("liftoff"));
        assert_eq!(out.trace.count("tick"), 4);
    }

    #[tokio::test]
    async fn test_retry_restarts_until_success() {
        let out = Demo::Retry.build().unwrap().run(json!({})).await.unwrap();
        assert_eq!(out.state.get_i64("attempts"), Some(3));
        assert_eq!(out.state.get_str("payload"), Some("fetched on attempt 3"));
        assert_eq!(out.trace.count("fetch"), 3);
        assert_eq!(out.trace.count("prepare"), 3);
        assert_eq!(out.trace.count("store"), 1);
    }

    #[tokio::test]
    async fn test_review_paths() {
        let wf = Demo::Review.build().unwrap();

        let out = wf.run(json!({})).await.unwrap();
        assert_eq!(out.state.get_str("status"), Some("published"));
        assert_eq!(
            out.trace.step_names(),
            vec!["draft", "review", "draft", "review", "publish"]
        );

        let out = wf.run(json!({"reject": true})).await.unwrap();
        assert_eq!(out.state.get_str("status"), Some("abandoned"));
        assert_eq!(out.trace.count("publish"), 0);
    }

    #[tokio::test]
    async fn test_invalid_demo_input() {
        let wf = Demo::Countdown.build().unwrap();
        assert!(wf.run(json!({"n": -1})).await.is_err());
    }
}
