use super::*;
use crate::error::EvalError;

#[parameterized(
    admin_views = { "alice", "view", "beach.jpg", Decision::Allow, &["admins-all"] },
    admin_edits_other_photo = { "alice", "edit", "beach.jpg", Decision::Allow, &["admins-all"] },
    admin_cannot_delete_private = { "alice", "delete", "secret.jpg", Decision::Deny, &["no-delete-private"] },
    admin_deletes_public = { "alice", "delete", "beach.jpg", Decision::Allow, &["admins-all"] },
    viewer_views_public = { "bob", "view", "beach.jpg", Decision::Allow, &["viewers-view"] },
    viewer_cannot_view_private = { "bob", "view", "secret.jpg", Decision::Deny, &[] },
    owner_edits_own = { "bob", "edit", "secret.jpg", Decision::Allow, &["owner-edit"] },
    owner_cannot_delete_private = { "bob", "delete", "secret.jpg", Decision::Deny, &["no-delete-private"] },
    carol_edits_own = { "carol", "edit", "beach.jpg", Decision::Allow, &["owner-edit"] },
    carol_cannot_view = { "carol", "view", "beach.jpg", Decision::Deny, &[] },
    unknown_user = { "dave", "view", "beach.jpg", Decision::Deny, &[] },
)]
fn test_is_authorized(principal: &str, verb: &str, resource: &str, expected: Decision, reasons: &[&str]) {
    let response = engine()
        .is_authorized(&photo_store(), &request(principal, verb, resource))
        .unwrap();
    assert_eq!(response.decision, expected, "{response}");
    let got: Vec<&str> = response.diagnostics.reasons.iter().map(PolicyId::as_str).collect();
    assert_eq!(got, reasons);
    assert!(response.diagnostics.errors.is_empty(), "{response}");
}

#[test]
fn test_empty_policy_set_denies() {
    let engine = PolicyEngine::new(PolicySet::new());
    let response = engine
        .is_authorized(&photo_store(), &request("alice", "view", "beach.jpg"))
        .unwrap();
    snapshot_decision!(response, @r#"
    {
      "decision": "Deny",
      "diagnostics": {
        "reasons": [],
        "errors": []
      }
    }
    "#);
}

#[test]
fn test_forbid_overrides_every_permit() {
    let policies = PolicySet::from_policies([
        ("permit-everything", Policy::permit()),
        ("forbid-delete", Policy::forbid().with_action(ScopeConstraint::Eq(action("delete")))),
        ("permit-admins", admins_all()),
        ("forbid-everything", Policy::forbid()),
    ])
    .unwrap();
    let response = PolicyEngine::new(policies)
        .is_authorized(&photo_store(), &request("alice", "delete", "beach.jpg"))
        .unwrap();
    snapshot_decision!(response, @r#"
    {
      "decision": "Deny",
      "diagnostics": {
        "reasons": [
          "forbid-delete",
          "forbid-everything"
        ],
        "errors": []
      }
    }
    "#);
}

#[test]
fn test_failing_policy_is_reported_and_skipped() {
    let mut policies = photo_policies();
    policies.add("rated", rated()).unwrap();
    let response = PolicyEngine::new(policies)
        .is_authorized(&photo_store(), &request("alice", "view", "beach.jpg"))
        .unwrap();
    snapshot_decision!(response, @r#"
    {
      "decision": "Allow",
      "diagnostics": {
        "reasons": [
          "admins-all"
        ],
        "errors": [
          {
            "policy_id": "rated",
            "error": {
              "AttributeAccess": {
                "attr": "rating",
                "on": "Photo::\"beach.jpg\""
              }
            }
          }
        ]
      }
    }
    "#);
}

#[test]
fn test_failing_policy_alone_denies() {
    let policies = PolicySet::from_policies([("rated", rated())]).unwrap();
    let response = PolicyEngine::new(policies)
        .is_authorized(&photo_store(), &request("carol", "view", "beach.jpg"))
        .unwrap();
    assert_deny(&response);
    assert!(response.diagnostics.reasons.is_empty());
    assert_eq!(
        response.diagnostics.errors[0].error,
        EvalError::AttributeAccess {
            attr: "rating".to_string(),
            on: "Photo::\"beach.jpg\"".to_string(),
        }
    );
}

#[test]
fn test_errors_follow_declaration_order() {
    let overflow = Policy::permit().when(Expr::greater(
        Expr::add(Expr::val(i64::MAX), Expr::val(1_i64)),
        Expr::val(0_i64),
    ));
    let not_bool = Policy::permit().when(Expr::val(7_i64));
    let policies = PolicySet::from_policies([
        ("overflow", overflow),
        ("rated", rated()),
        ("not-bool", not_bool),
    ])
    .unwrap();
    let response = PolicyEngine::new(policies)
        .is_authorized(&photo_store(), &request("carol", "view", "beach.jpg"))
        .unwrap();
    let ids: Vec<&str> = response
        .diagnostics
        .errors
        .iter()
        .map(|e| e.policy_id.as_str())
        .collect();
    assert_eq!(ids, ["overflow", "rated", "not-bool"]);
    assert!(matches!(
        response.diagnostics.errors[0].error,
        EvalError::Overflow { .. }
    ));
    assert!(matches!(
        response.diagnostics.errors[2].error,
        EvalError::TypeError { .. }
    ));
}

#[test]
fn test_context_conditions() {
    let policies = PolicySet::from_policies([(
        "mfa-view",
        Policy::permit()
            .with_action(ScopeConstraint::Eq(action("view")))
            .when(Expr::get_attr(Expr::context(), "mfa")),
    )])
    .unwrap();
    let engine = PolicyEngine::new(policies);
    let store = photo_store();

    let with_mfa = request("carol", "view", "beach.jpg")
        .with_context(Value::record([("mfa", Value::Bool(true))]))
        .unwrap();
    assert_allow(&engine.is_authorized(&store, &with_mfa).unwrap());

    // Without the attribute the condition errors, which denies.
    let without = request("carol", "view", "beach.jpg");
    let response = engine.is_authorized(&store, &without).unwrap();
    assert_deny(&response);
    assert_eq!(response.diagnostics.errors.len(), 1);
}

#[test]
fn test_malformed_context_is_rejected() {
    let malformed = Request {
        context: Value::Long(1),
        ..request("alice", "view", "beach.jpg")
    };
    let err = engine().is_authorized(&photo_store(), &malformed).unwrap_err();
    assert!(matches!(err, PolicyError::RequestTypeError(_)), "{err}");
    assert_eq!(err.to_string(), "malformed request: context must be a record, got long");
}

#[test]
fn test_policies_lists_ids_in_order() {
    let ids: Vec<String> = engine()
        .policies()
        .unwrap()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(ids, ["admins-all", "viewers-view", "owner-edit", "no-delete-private"]);
}

#[test]
fn test_concurrent_evaluation() {
    use std::thread;

    let engine = engine();
    let mut handles = vec![];

    for i in 0..8 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            let store = photo_store();
            let principal = if i % 2 == 0 { "alice" } else { "carol" };
            for _ in 0..100 {
                let response = engine
                    .is_authorized(&store, &request(principal, "view", "beach.jpg"))
                    .unwrap();
                assert_eq!(response.is_allowed(), principal == "alice");
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}
