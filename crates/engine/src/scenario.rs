//! Scenario runner – execute scripted flows from YAML files.

use crate::commands::{press_keys, CommandRegistry};
use crate::context::AppContext;
use crate::types::*;
use std::time::Duration;

/// Load a scenario from a YAML string.
pub fn load_scenario(yaml: &str) -> Result<Scenario, String> {
    serde_yaml::from_str(yaml).map_err(|e| format!("failed to parse scenario YAML: {}", e))
}

/// Execute a scenario and return the overall result.
///
/// `keys` steps all press the same calculator, so a scenario can enter an
/// operand in one step and finish the expression in a later one.
pub async fn run_scenario(
    scenario: &Scenario,
    ctx: &AppContext,
    registry: &CommandRegistry,
) -> ScenarioResult {
    let mut step_results = Vec::new();
    let mut overall = Status::Pass;
    let mut calc = ctx.new_calculator();

    for (i, step) in scenario.steps.iter().enumerate() {
        let result = match step {
            ScenarioStep::Call {
                call,
                args,
                expect_status,
                timeout_ms,
            } => {
                let run = registry.execute(call, args.clone(), ctx);
                let mut r = match tokio::time::timeout(Duration::from_millis(*timeout_ms), run).await {
                    Ok(r) => r,
                    Err(_) => result_err(
                        "call",
                        call,
                        &new_run_id(),
                        *timeout_ms,
                        ErrorCode::Timeout,
                        format!("step timed out after {}ms", timeout_ms),
                    ),
                };
                let actual_status = r.status.as_str();
                if actual_status != expect_status.as_str() {
                    tracing::warn!(
                        step = i,
                        expected = %expect_status,
                        actual = %actual_status,
                        "scenario step status mismatch"
                    );
                    overall = Status::Fail;
                    if r.status == Status::Pass {
                        mark_failed(
                            &mut r,
                            ErrorCode::InvalidInput,
                            format!("expected status {}, got pass", expect_status),
                        );
                    }
                }
                r
            }
            ScenarioStep::Keys {
                keys,
                expect_display,
            } => {
                let mut r = press_keys(&mut calc, keys);
                if r.status != Status::Pass {
                    overall = Status::Fail;
                } else if let Some(expected) = expect_display {
                    if calc.display() != expected {
                        tracing::warn!(
                            step = i,
                            expected = %expected,
                            actual = %calc.display(),
                            "scenario display mismatch"
                        );
                        mark_failed(
                            &mut r,
                            ErrorCode::InvalidInput,
                            format!("expected display {:?}, got {:?}", expected, calc.display()),
                        );
                        overall = Status::Fail;
                    }
                }
                r
            }
        };
        step_results.push(result);
    }

    ScenarioResult {
        name: scenario.name.clone(),
        overall_status: overall,
        step_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let yaml = r#"
name: basic test
steps:
  - call: "contacts.list"
    args: {}
    expect_status: "pass"
    timeout_ms: 5000
  - keys: "2 + 3 ="
    expect_display: "5"
"#;
        let s = load_scenario(yaml).expect("should parse");
        assert_eq!(s.name, Some("basic test".into()));
        assert_eq!(s.steps.len(), 2);
        assert!(matches!(s.steps[1], ScenarioStep::Keys { .. }));
    }

    #[test]
    fn test_parse_scenario_minimal() {
        let yaml = r#"
steps:
  - call: "contacts.get"
    args:
      id: 1
"#;
        let s = load_scenario(yaml).expect("should parse");
        match &s.steps[0] {
            ScenarioStep::Call {
                expect_status,
                timeout_ms,
                ..
            } => {
                assert_eq!(expect_status, "pass");
                assert_eq!(*timeout_ms, 30_000);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_scenario_rejects_garbage() {
        assert!(load_scenario("steps: 12").is_err());
    }

    #[tokio::test]
    async fn test_run_scenario_keys_share_calculator() {
        let yaml = r#"
steps:
  - keys: "2 +"
  - keys: "3 ×"
    expect_display: "5"
  - keys: "4 ="
    expect_display: "20"
"#;
        let scenario = load_scenario(yaml).unwrap();
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = run_scenario(&scenario, &ctx, &reg).await;
        assert_eq!(result.overall_status, Status::Pass);
        assert_eq!(result.step_results.len(), 3);
    }

    #[tokio::test]
    async fn test_run_scenario_display_mismatch_fails() {
        let yaml = r#"
steps:
  - keys: "1 / 3 ="
    expect_display: "0.33"
"#;
        let scenario = load_scenario(yaml).unwrap();
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = run_scenario(&scenario, &ctx, &reg).await;
        assert_eq!(result.overall_status, Status::Fail);
        assert_eq!(result.step_results[0].status, Status::Fail);
    }

    #[tokio::test]
    async fn test_run_scenario_contacts() {
        let yaml = r#"
name: contact round trip
steps:
  - call: "contacts.add"
    args:
      name: Ada
      surname: Lovelace
      email: ada@example.com
      phone: "555"
  - call: "contacts.get"
    args:
      id: 3
  - call: "contacts.delete"
    args:
      id: 3
  - call: "contacts.get"
    args:
      id: 3
    expect_status: "error"
"#;
        let scenario = load_scenario(yaml).unwrap();
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = run_scenario(&scenario, &ctx, &reg).await;
        assert_eq!(result.overall_status, Status::Pass);
        assert_eq!(result.step_results[3].status, Status::Error);
    }

    #[tokio::test]
    async fn test_run_scenario_unexpected_pass_fails() {
        let yaml = r#"
steps:
  - call: "contacts.list"
    expect_status: "error"
"#;
        let scenario = load_scenario(yaml).unwrap();
        let ctx = AppContext::in_memory();
        let reg = CommandRegistry::new();
        let result = run_scenario(&scenario, &ctx, &reg).await;
        assert_eq!(result.overall_status, Status::Fail);
        assert_eq!(result.step_results[0].status, Status::Fail);
    }
}
