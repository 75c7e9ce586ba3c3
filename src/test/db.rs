#[cfg(test)]
mod tests {
    use crate::db::{authenticate_user, create_user, find_user_by_username, update_profile};
    use crate::error::AppError;
    use crate::test::test_utils::{STANDARD_PASSWORD, TestDbBuilder};
    use rocket::tokio;

    #[tokio::test]
    async fn test_create_and_find_user() {
        let test_db = TestDbBuilder::new()
            .user("casey")
            .build()
            .await
            .expect("Failed to build test database");

        let user = find_user_by_username(&test_db.pool, "casey")
            .await
            .expect("Failed to query user")
            .expect("User should exist");

        assert_eq!(user.username, "casey");
        assert_eq!(user.email, "casey@example.com");
        assert_eq!(user.id, test_db.user_id("casey").unwrap());

        let missing = find_user_by_username(&test_db.pool, "nobody")
            .await
            .expect("Failed to query user");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let test_db = TestDbBuilder::new()
            .user("casey")
            .build()
            .await
            .expect("Failed to build test database");

        let result = create_user(
            &test_db.pool,
            "Someone Else",
            "else@example.com",
            "casey",
            "hunter2",
        )
        .await;

        match result {
            Err(AppError::Validation(_)) => {}
            other => panic!("Expected validation error, got {:?}", other),
        }

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind("casey")
            .fetch_one(&test_db.pool)
            .await
            .expect("Count query failed");
        assert_eq!(count, 1, "Failed registration must not create a row");
    }

    #[tokio::test]
    async fn test_authentication_failures_are_uniform() {
        let test_db = TestDbBuilder::new()
            .user("casey")
            .build()
            .await
            .expect("Failed to build test database");

        let wrong_password = authenticate_user(&test_db.pool, "casey", "wrong")
            .await
            .expect("Authentication should not error");
        let unknown_user = authenticate_user(&test_db.pool, "nobody", STANDARD_PASSWORD)
            .await
            .expect("Authentication should not error");

        assert!(wrong_password.is_none());
        assert!(unknown_user.is_none());

        let valid = authenticate_user(&test_db.pool, "casey", STANDARD_PASSWORD)
            .await
            .expect("Authentication should not error");
        assert!(valid.is_some());
        assert_eq!(valid.unwrap().username, "casey");
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_username() {
        let test_db = TestDbBuilder::new()
            .user("casey")
            .user("dana")
            .build()
            .await
            .expect("Failed to build test database");

        let casey_id = test_db.user_id("casey").unwrap();

        let result = update_profile(
            &test_db.pool,
            casey_id,
            "Casey",
            "casey@example.com",
            "dana",
        )
        .await;

        match result {
            Err(AppError::Validation(_)) => {}
            other => panic!("Expected validation error, got {:?}", other),
        }

        // Keeping your own username is not a collision.
        update_profile(
            &test_db.pool,
            casey_id,
            "Casey Renamed",
            "casey.new@example.com",
            "casey",
        )
        .await
        .expect("Updating own profile should succeed");

        let user = find_user_by_username(&test_db.pool, "casey")
            .await
            .expect("Failed to query user")
            .expect("User should exist");
        assert_eq!(user.name, "Casey Renamed");
        assert_eq!(user.email, "casey.new@example.com");
    }
}
