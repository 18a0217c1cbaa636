mod common;

use common::MockDriver;
use queryhaus::prelude::*;

#[tokio::test]
async fn test_batch_commits_all_statements() {
    let driver = MockDriver::new();
    let db = driver.client();

    let results = db
        .execute_transaction(&[
            Statement::new("INSERT INTO Guests (Name) VALUES (@name)", Params::new().with("name", "Ada")),
            Statement::text("SELECT * FROM Guests"),
            Statement::new("INSERT INTO Audit (Action) VALUES (@action)", Params::new().with("action", "add")),
        ])
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[1][0]["statement"], "SELECT * FROM Guests");
    assert_eq!(driver.applied().len(), 2);
    assert_eq!(driver.rollbacks(), 0);
}

#[tokio::test]
async fn test_failing_statement_rolls_back_batch() {
    let driver = MockDriver::new();
    let db = driver.client();

    let err = db
        .execute_transaction(&[
            Statement::text("INSERT INTO Guests (Name) VALUES ('Ada')"),
            Statement::text("INSERT INTO FAIL VALUES (1)"),
            Statement::text("INSERT INTO Guests (Name) VALUES ('Grace')"),
        ])
        .await
        .unwrap_err();

    match err {
        QueryHausError::Transaction { index, .. } => assert_eq!(index, Some(1)),
        other => panic!("expected transaction error, got {:?}", other),
    }
    assert!(driver.applied().is_empty());
    assert_eq!(driver.rollbacks(), 1);
    // Third statement never reached the driver
    assert_eq!(driver.query_calls(), 2);

    let recent = db.metrics().recent(1);
    assert_eq!(recent[0].operation, "transaction");
    assert!(!recent[0].success);
}

#[tokio::test]
async fn test_empty_batch_does_not_connect() {
    let driver = MockDriver::new();
    let db = driver.client();

    let results = db.execute_transaction(&[]).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(driver.connect_calls(), 0);
}

#[tokio::test]
async fn test_statement_conversions() {
    let params = Params::new().with("id", 1);
    let a: Statement = ("DELETE FROM Guests WHERE Id = @id", params.clone()).into();
    let b: Statement = (String::from("DELETE FROM Guests WHERE Id = @id"), params).into();
    assert_eq!(a, b);
}
