//! Sessions against live servers. These need the servers behind
//! `TEST_PG_URL`, `TEST_MYSQL_URL` and `TEST_REDIS_URL` and are skipped by
//! default; run them with `cargo test -- --ignored`.
