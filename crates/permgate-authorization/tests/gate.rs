//! AuthorizationGate with a scripted admin check

#![allow(clippy::unwrap_used)]

use permgate_authorization::{AccessDenied, AuthorizationGate, GateError, SelfProtectionViolation};
use permgate_core::{GroupName, Principal, ResourceRef, Right, RightsMutation, UserId};
use permgate_testkit::{ScriptedAdminCheck, TokenBuilder, Verdict};
use std::sync::Arc;

fn gate(check: &ScriptedAdminCheck) -> AuthorizationGate {
    AuthorizationGate::new(Arc::new(check.clone()))
}

fn device() -> ResourceRef {
    ResourceRef::parse("device", "dev-1").unwrap()
}

fn user(name: &str) -> Principal {
    Principal::User(UserId::parse(name).unwrap())
}

#[tokio::test]
async fn allowed_mutation_consults_check_once() {
    let check = ScriptedAdminCheck::allow();
    let alice = TokenBuilder::user("alice");
    let mutation = RightsMutation::set(device(), user("bob"), Right::new("r"));

    gate(&check)
        .authorize(&alice.context(), &mutation)
        .await
        .unwrap();

    let calls = check.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].user.as_str(), "alice");
    assert_eq!(calls[0].credential, alice.header());
    assert_eq!(calls[0].resource, device());
}

#[tokio::test]
async fn self_protection_skips_remote_check() {
    let check = ScriptedAdminCheck::allow();
    let alice = TokenBuilder::user("alice").context();

    let own_delete = RightsMutation::delete(device(), user("alice"));
    assert_eq!(
        gate(&check).authorize(&alice, &own_delete).await,
        Err(GateError::SelfProtection(
            SelfProtectionViolation::OwnRightsRemoval
        ))
    );

    let admin_group = Principal::Group(GroupName::parse("admin").unwrap());
    let demote = RightsMutation::set(device(), admin_group, Right::new("r"));
    assert_eq!(
        gate(&check).authorize(&alice, &demote).await,
        Err(GateError::SelfProtection(
            SelfProtectionViolation::ReservedGroupProtected
        ))
    );

    assert_eq!(check.call_count(), 0);
}

#[tokio::test]
async fn admin_claim_may_demote_reserved_group() {
    let check = ScriptedAdminCheck::allow();
    let root = TokenBuilder::user("root").admin().context();
    let admin_group = Principal::Group(GroupName::parse("admin").unwrap());

    gate(&check)
        .authorize(&root, &RightsMutation::delete(device(), admin_group))
        .await
        .unwrap();

    assert_eq!(check.call_count(), 1);
}

#[tokio::test]
async fn remote_denial_and_outage_deny() {
    let check = ScriptedAdminCheck::deny(403);
    let alice = TokenBuilder::user("alice").context();
    let mutation = RightsMutation::clear(device(), user("bob"));

    assert_eq!(
        gate(&check).authorize(&alice, &mutation).await,
        Err(GateError::Denied(AccessDenied::Rejected { status: 403 }))
    );

    check.set_verdict(Verdict::Unreachable);
    assert!(matches!(
        gate(&check).authorize(&alice, &mutation).await,
        Err(GateError::Denied(AccessDenied::Unreachable { .. }))
    ));
}
