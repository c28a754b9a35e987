use chrono::{TimeZone, Utc};

use crate::errors::LedgerError;
use crate::invariants::{
    check_allocation, check_conservation, check_entity, check_ledger, check_transition,
    LedgerTotals,
};
use crate::types::{Allocation, FundKind, Fundable, Transfer};
use crate::allocate;

fn entity(kind: FundKind, id: i64, full: i64) -> Fundable {
    Fundable::new(id, kind, full, Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap())
}

fn is_violation<T: std::fmt::Debug>(r: crate::Result<T>) -> bool {
    matches!(r, Err(LedgerError::InvariantViolation(_)))
}

#[test]
fn test_entity_checks() {
    let mut f = entity(FundKind::CharityProject, 1, 100);
    assert!(check_entity(&f).is_ok());

    f.invested_amount = 101;
    assert!(is_violation(check_entity(&f)));

    f.invested_amount = 100;
    // full but not marked closed
    assert!(is_violation(check_entity(&f)));

    f.fully_invested = true;
    // closed without a close_date
    assert!(is_violation(check_entity(&f)));

    f.close_date = Some(Utc::now());
    assert!(check_entity(&f).is_ok());

    let mut open_with_date = entity(FundKind::Donation, 2, 10);
    open_with_date.close_date = Some(Utc::now());
    assert!(is_violation(check_entity(&open_with_date)));

    let negative = entity(FundKind::Donation, 3, 0);
    assert!(is_violation(check_entity(&negative)));
}

#[test]
fn test_transition_rejects_decrease_and_target_change() {
    let mut before = entity(FundKind::Donation, 1, 100);
    before.invested_amount = 40;

    let mut after = before.clone();
    after.invested_amount = 30;
    assert!(is_violation(check_transition(&before, &after)));

    let mut after = before.clone();
    after.full_amount = 200;
    assert!(is_violation(check_transition(&before, &after)));

    let mut after = before.clone();
    after.invested_amount = 60;
    assert!(check_transition(&before, &after).is_ok());
}

#[test]
fn test_transition_rejects_mutating_closed_entity() {
    let mut before = entity(FundKind::CharityProject, 1, 10);
    before.invested_amount = 10;
    before.fully_invested = true;
    before.close_date = Some(Utc::now());

    let mut after = before.clone();
    after.close_date = Some(Utc::now() + chrono::Duration::seconds(5));
    assert!(is_violation(check_transition(&before, &after)));
    assert!(check_transition(&before, &before.clone()).is_ok());
}

#[test]
fn test_conservation() {
    let p = entity(FundKind::CharityProject, 1, 100);
    let d = entity(FundKind::Donation, 1, 100);
    let before = vec![p.clone(), d.clone()];

    let mut p2 = p.clone();
    p2.invested_amount = 25;
    let mut d2 = d.clone();
    d2.invested_amount = 25;
    assert!(check_conservation(&before, &[p2.clone(), d2.clone()]).is_ok());

    d2.invested_amount = 20;
    assert!(is_violation(check_conservation(&before, &[p2, d2])));
}

#[test]
fn test_real_allocation_passes_guard() {
    let pool = vec![
        entity(FundKind::CharityProject, 1, 50),
        entity(FundKind::CharityProject, 2, 100),
    ];
    let src = entity(FundKind::Donation, 1, 80);
    let mut before = pool.clone();
    before.push(src.clone());

    let out = allocate(src, FundKind::CharityProject, pool).unwrap();
    assert!(check_allocation(&before, &out).is_ok());
}

#[test]
fn test_forged_allocation_fails_guard() {
    let p = entity(FundKind::CharityProject, 1, 50);
    let src = entity(FundKind::Donation, 1, 80);
    let before = vec![p.clone(), src.clone()];

    // project credited more than the donation was debited
    let mut touched = p.clone();
    touched.invested_amount = 50;
    touched.fully_invested = true;
    touched.close_date = Some(Utc::now());
    let mut source = src.clone();
    source.invested_amount = 40;
    let forged = Allocation {
        source,
        touched: vec![touched],
        transfers: vec![Transfer { counterpart_id: 1, amount: 40 }],
    };
    assert!(is_violation(check_allocation(&before, &forged)));

    // mutates an entity that was never in the snapshot
    let stranger = entity(FundKind::CharityProject, 9, 10);
    let forged = Allocation {
        source: src,
        touched: vec![stranger],
        transfers: vec![],
    };
    assert!(is_violation(check_allocation(&before, &forged)));
}

#[test]
fn test_ledger_totals_and_balance() {
    let mut p = entity(FundKind::CharityProject, 1, 100);
    p.invested_amount = 70;
    let mut d = entity(FundKind::Donation, 1, 70);
    d.invested_amount = 70;
    d.fully_invested = true;
    d.close_date = Some(Utc::now());
    let open_d = entity(FundKind::Donation, 2, 5);

    let totals = check_ledger(&[p.clone(), d.clone(), open_d]).unwrap();
    assert_eq!(
        totals,
        LedgerTotals {
            projects_invested: 70,
            donations_invested: 70,
            open_projects: 1,
            open_donations: 1,
        }
    );
    assert!(totals.is_balanced());

    p.invested_amount = 60;
    assert!(is_violation(check_ledger(&[p, d])));
}
