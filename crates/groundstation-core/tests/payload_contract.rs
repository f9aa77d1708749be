//! Contract Test: Failure Report Wire Format
//!
//! Constraints verified:
//! - The broker payload has exactly the fields name, description, attempts,
//!   error_list, in that order
//! - error_list carries the failed instruction's own issues, in order
//!
//! If this test fails, downstream broker consumers break.

use groundstation_core::payload::FailureReport;
use groundstation_core::InstructionOutcome;

#[test]
fn slew_failure_serializes_to_documented_shape() {
    let outcome = InstructionOutcome::failed("Slew")
        .with_description("Slew the mount to the target coordinates")
        .with_attempts(3)
        .with_issue("timeout");

    let json = FailureReport::from_outcome(&outcome).to_json().unwrap();
    assert_eq!(
        json,
        r#"{"name":"Slew","description":"Slew the mount to the target coordinates","attempts":3,"error_list":[{"reason":"timeout"}]}"#
    );
}

#[test]
fn issues_keep_their_order() {
    let outcome = InstructionOutcome::failed("Autofocus")
        .with_issues(["star count too low", "HFR did not converge"]);

    let value: serde_json::Value =
        serde_json::from_str(&FailureReport::from_outcome(&outcome).to_json().unwrap()).unwrap();

    assert_eq!(value["error_list"][0]["reason"], "star count too low");
    assert_eq!(value["error_list"][1]["reason"], "HFR did not converge");
    assert_eq!(value.as_object().unwrap().len(), 4);
}
