#[cfg(test)]
mod tests {
    use crate::db::{create_link, delete_link, list_links, update_link};
    use crate::error::AppError;
    use crate::test::test_utils::TestDbBuilder;
    use rocket::tokio;

    #[tokio::test]
    async fn test_link_crud() {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .build()
            .await
            .expect("Failed to build test database");
        let alice = test_db.user_id("alice").unwrap();

        let id = create_link(
            &test_db.pool,
            alice,
            "Scholarship portal",
            "https://scholarships.example.com",
        )
        .await
        .expect("Failed to create link");

        let links = list_links(&test_db.pool, alice)
            .await
            .expect("Failed to list links");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Scholarship portal");
        assert_eq!(links[0].url, "https://scholarships.example.com");

        update_link(
            &test_db.pool,
            id,
            alice,
            "Grant portal",
            "https://grants.example.com",
        )
        .await
        .expect("Failed to update link");

        let links = list_links(&test_db.pool, alice)
            .await
            .expect("Failed to list links");
        assert_eq!(links[0].title, "Grant portal");
        assert_eq!(links[0].url, "https://grants.example.com");

        delete_link(&test_db.pool, id, alice)
            .await
            .expect("Failed to delete link");

        let links = list_links(&test_db.pool, alice)
            .await
            .expect("Failed to list links");
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn test_link_ownership() {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .user("bob")
            .build()
            .await
            .expect("Failed to build test database");
        let alice = test_db.user_id("alice").unwrap();
        let bob = test_db.user_id("bob").unwrap();

        let id = create_link(
            &test_db.pool,
            alice,
            "Scholarship portal",
            "https://scholarships.example.com",
        )
        .await
        .expect("Failed to create link");

        // Another user's links don't show up in the listing.
        let bobs_links = list_links(&test_db.pool, bob)
            .await
            .expect("Failed to list links");
        assert!(bobs_links.is_empty());

        let update = update_link(&test_db.pool, id, bob, "Hijacked", "https://evil.example.com").await;
        assert!(matches!(update, Err(AppError::NotFound(_))));

        let delete = delete_link(&test_db.pool, id, bob).await;
        assert!(matches!(delete, Err(AppError::NotFound(_))));

        let links = list_links(&test_db.pool, alice)
            .await
            .expect("Failed to list links");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Scholarship portal");
    }
}
