//! Ledger consistency tests: the cached balance must equal the sum of
//! ledger deltas after any sequence of operations.

use satchel::db::ledger::{
    balance_of, credit, debit, history, ledger_sum, settle_download, EntryType,
};
use satchel::db::notes::{create_note, get_note, CreateNoteInput};
use satchel::db::users::{create_user, CreateUserInput};
use satchel::db::MarketDb;
use satchel::MarketError;

fn register(db: &MarketDb, identifier: &str, bonus: i64) -> String {
    db.with_conn_mut(|conn| {
        create_user(
            conn,
            CreateUserInput {
                identifier: identifier.to_string(),
                identifier_type: "email".to_string(),
                password_hash: "$argon2id$test".to_string(),
                role: "member".to_string(),
            },
            bonus,
        )
    })
    .unwrap()
    .id
}

// The starting bonus is itself a ledger entry, so projection and sum
// must agree exactly at all times
fn assert_invariant(db: &MarketDb, user: &str) {
    let balance = db.with_conn(|c| balance_of(c, user)).unwrap();
    let sum = db.with_conn(|c| ledger_sum(c, user)).unwrap();
    assert_eq!(balance, sum, "balance projection drifted from ledger");
    assert!(balance >= 0);
}

#[test]
fn invariant_holds_across_mixed_operations() {
    let db = MarketDb::open_in_memory().unwrap();
    let user = register(&db, "user@example.com", 50);

    db.with_conn_mut(|conn| {
        credit(conn, &user, 100, EntryType::CoinPurchased, None, Some("Coin pack"))?;
        debit(conn, &user, 40, EntryType::CoinSpent, None, None)?;
        credit(conn, &user, 20, EntryType::UploadReward, None, None)?;
        debit(conn, &user, 130, EntryType::DownloadPaid, None, None)
    })
    .unwrap();

    assert_invariant(&db, &user);
    assert_eq!(db.with_conn(|c| balance_of(c, &user)).unwrap(), 0);
}

#[test]
fn failed_operations_leave_no_trace() {
    let db = MarketDb::open_in_memory().unwrap();
    let user = register(&db, "user@example.com", 10);

    // Overdraw
    let err = db
        .with_conn_mut(|conn| debit(conn, &user, 11, EntryType::CoinSpent, None, None))
        .unwrap_err();
    assert!(matches!(err, MarketError::InsufficientBalance { .. }));

    // Zero and negative amounts
    for amount in [0, -1] {
        assert!(db
            .with_conn_mut(|conn| credit(conn, &user, amount, EntryType::CoinEarned, None, None))
            .is_err());
    }

    assert_invariant(&db, &user);
    // Only the starting bonus entry exists
    assert_eq!(db.with_conn(|c| history(c, &user, 10, 0)).unwrap().len(), 1);
}

#[test]
fn paid_download_settles_both_wallets() {
    let db = MarketDb::open_in_memory().unwrap();
    let seller = register(&db, "seller@example.com", 0);
    let buyer = register(&db, "buyer@example.com", 50);

    let note = db
        .with_conn(|conn| {
            create_note(
                conn,
                &seller,
                CreateNoteInput {
                    title: "Statistics formula sheet".to_string(),
                    subject: "statistics".to_string(),
                    description: "Every formula from the lecture series".to_string(),
                    price_coins: 30,
                    attachments: vec![],
                    draft: false,
                },
            )
        })
        .unwrap()
        .id;

    let entry = db
        .with_conn_mut(|conn| settle_download(conn, &note, &buyer))
        .unwrap()
        .expect("a priced download writes a debit entry");
    assert_eq!(entry.coin_change, -30);

    assert_eq!(db.with_conn(|c| balance_of(c, &buyer)).unwrap(), 20);
    assert_eq!(db.with_conn(|c| balance_of(c, &seller)).unwrap(), 30);
    assert_invariant(&db, &buyer);
    assert_invariant(&db, &seller);

    let row = db.with_conn(|c| get_note(c, &note)).unwrap().unwrap();
    assert_eq!(row.downloads_count, 1);

    // A second purchase would overdraw the remaining 20 and rolls back whole
    let err = db
        .with_conn_mut(|conn| settle_download(conn, &note, &buyer))
        .unwrap_err();
    assert!(matches!(err, MarketError::InsufficientBalance { .. }));
    assert_eq!(db.with_conn(|c| balance_of(c, &buyer)).unwrap(), 20);
    assert_eq!(db.with_conn(|c| balance_of(c, &seller)).unwrap(), 30);
    let row = db.with_conn(|c| get_note(c, &note)).unwrap().unwrap();
    assert_eq!(row.downloads_count, 1);
}

#[test]
fn history_pages_newest_first() {
    let db = MarketDb::open_in_memory().unwrap();
    let user = register(&db, "user@example.com", 0);

    db.with_conn_mut(|conn| {
        for i in 1..=5 {
            credit(
                conn,
                &user,
                i,
                EntryType::CoinEarned,
                None,
                Some(&format!("grant {}", i)),
            )?;
        }
        Ok(())
    })
    .unwrap();

    let first_page = db.with_conn(|c| history(c, &user, 2, 0)).unwrap();
    assert_eq!(first_page.len(), 2);
    assert_eq!(first_page[0].description.as_deref(), Some("grant 5"));

    let second_page = db.with_conn(|c| history(c, &user, 2, 2)).unwrap();
    assert_eq!(second_page[0].description.as_deref(), Some("grant 3"));
}
