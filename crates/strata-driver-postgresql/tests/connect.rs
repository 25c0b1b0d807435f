use strata_driver_postgresql::PostgreSQL;

// ---------------------------------------------------------------------------
// Connection URLs are validated before any connection is attempted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejects_other_schemes() {
    let err = PostgreSQL::connect("mysql://localhost/app").await.unwrap_err();
    assert!(err.to_string().contains("`postgresql` scheme"));
    assert_eq!(err.code(), None);
}

#[tokio::test]
async fn requires_a_database() {
    let err = PostgreSQL::connect("postgresql://localhost").await.unwrap_err();
    assert!(err.to_string().contains("no database specified"));

    let err = PostgreSQL::connect("postgres://localhost/").await.unwrap_err();
    assert!(err.to_string().contains("no database specified"));
}

#[tokio::test]
async fn rejects_a_bad_pool_size() {
    let err = PostgreSQL::connect("postgresql://localhost/app?pool_max_size=many")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid pool_max_size"));
}

#[tokio::test]
async fn rejects_malformed_urls() {
    assert!(PostgreSQL::connect("not a url").await.is_err());
}
