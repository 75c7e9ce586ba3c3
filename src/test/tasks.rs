#[cfg(test)]
mod tests {
    use crate::db::{add_task, get_tasks_for_opportunity, list_tasks, set_task_status};
    use crate::error::AppError;
    use crate::models::TaskStatus;
    use crate::test::test_utils::TestDbBuilder;
    use rocket::tokio;

    #[tokio::test]
    async fn test_add_task_trims_and_capitalizes() {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .opportunity("alice", "Acme Corp", "Summer Internship")
            .build()
            .await
            .expect("Failed to build test database");
        let alice = test_db.user_id("alice").unwrap();
        let opp_id = test_db.opportunity_id("Summer Internship").unwrap();

        add_task(&test_db.pool, alice, opp_id, "  finish essay  ")
            .await
            .expect("Failed to add task");

        let tasks = get_tasks_for_opportunity(&test_db.pool, opp_id)
            .await
            .expect("Failed to list tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "Finish essay");
        assert_eq!(tasks[0].status, TaskStatus::NotDone);
    }

    #[tokio::test]
    async fn test_add_task_empty_after_trim_rejected() {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .opportunity("alice", "Acme Corp", "Summer Internship")
            .build()
            .await
            .expect("Failed to build test database");
        let alice = test_db.user_id("alice").unwrap();
        let opp_id = test_db.opportunity_id("Summer Internship").unwrap();

        let result = add_task(&test_db.pool, alice, opp_id, "   ").await;
        match result {
            Err(AppError::Validation(_)) => {}
            other => panic!("Expected validation error, got {:?}", other),
        }

        assert_eq!(
            test_db
                .count("SELECT COUNT(*) FROM tasks WHERE opp_id = ?", opp_id)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_add_task_requires_owned_opportunity() {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .user("bob")
            .opportunity("alice", "Acme Corp", "Summer Internship")
            .build()
            .await
            .expect("Failed to build test database");
        let bob = test_db.user_id("bob").unwrap();
        let opp_id = test_db.opportunity_id("Summer Internship").unwrap();

        let result = add_task(&test_db.pool, bob, opp_id, "Steal the essay").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        assert_eq!(
            test_db
                .count("SELECT COUNT(*) FROM tasks WHERE opp_id = ?", opp_id)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_set_status_and_filter() {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .opportunity_with(
                "alice",
                "Acme Corp",
                "Summer Internship",
                crate::models::OpportunityStatus::HaventStarted,
                "Write essay, Submit transcript",
            )
            .build()
            .await
            .expect("Failed to build test database");
        let alice = test_db.user_id("alice").unwrap();
        let opp_id = test_db.opportunity_id("Summer Internship").unwrap();

        let tasks = get_tasks_for_opportunity(&test_db.pool, opp_id)
            .await
            .expect("Failed to list tasks");
        let first = tasks[0].id;

        set_task_status(&test_db.pool, first, alice, true)
            .await
            .expect("Failed to set task status");

        let done = list_tasks(&test_db.pool, alice, Some(TaskStatus::Done))
            .await
            .expect("Failed to list tasks");
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].description, "Write essay");
        assert_eq!(done[0].opp_title, "Summer Internship");

        let not_done = list_tasks(&test_db.pool, alice, Some(TaskStatus::NotDone))
            .await
            .expect("Failed to list tasks");
        assert_eq!(not_done.len(), 1);
        assert_eq!(not_done[0].description, "Submit transcript");

        let all = list_tasks(&test_db.pool, alice, None)
            .await
            .expect("Failed to list tasks");
        assert_eq!(all.len(), 2);

        // Toggling back works too.
        set_task_status(&test_db.pool, first, alice, false)
            .await
            .expect("Failed to reset task status");
        let done = list_tasks(&test_db.pool, alice, Some(TaskStatus::Done))
            .await
            .expect("Failed to list tasks");
        assert!(done.is_empty());
    }

    #[tokio::test]
    async fn test_set_status_ownership() {
        let test_db = TestDbBuilder::new()
            .user("alice")
            .user("bob")
            .opportunity_with(
                "alice",
                "Acme Corp",
                "Summer Internship",
                crate::models::OpportunityStatus::HaventStarted,
                "Write essay",
            )
            .build()
            .await
            .expect("Failed to build test database");
        let alice = test_db.user_id("alice").unwrap();
        let bob = test_db.user_id("bob").unwrap();
        let opp_id = test_db.opportunity_id("Summer Internship").unwrap();

        let tasks = get_tasks_for_opportunity(&test_db.pool, opp_id)
            .await
            .expect("Failed to list tasks");
        let task_id = tasks[0].id;

        let result = set_task_status(&test_db.pool, task_id, bob, true).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let missing = set_task_status(&test_db.pool, 9999, alice, true).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let all = list_tasks(&test_db.pool, alice, Some(TaskStatus::Done))
            .await
            .expect("Failed to list tasks");
        assert!(all.is_empty(), "Foreign toggle must not change state");
    }
}
