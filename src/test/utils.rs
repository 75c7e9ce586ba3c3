#[cfg(test)]
pub mod test_utils {
    use crate::db::{create_opportunity, create_user};
    use crate::error::AppError;
    use crate::models::{OpportunityFields, OpportunityStatus};
    use chrono::NaiveDate;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    /// A plausible field set for one opportunity; deadlines are fixed so
    /// calendar assertions can rely on them.
    pub fn opportunity_fields(
        org_name: &str,
        title: &str,
        status: OpportunityStatus,
    ) -> OpportunityFields {
        OpportunityFields {
            org_name: org_name.to_string(),
            title: title.to_string(),
            app_deadline: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            personal_deadline: NaiveDate::from_ymd_opt(2026, 8, 15).unwrap(),
            requirements: String::new(),
            link: format!(
                "https://example.com/{}",
                title.to_lowercase().replace(' ', "-")
            ),
            short_description: String::new(),
            category: "Job".to_string(),
            priority: 1,
            status,
            notes: String::new(),
            other_info: String::new(),
            contact_info: String::new(),
            location: String::new(),
        }
    }

    struct TestUser {
        username: String,
    }

    struct TestOpportunity {
        owner: String,
        org_name: String,
        title: String,
        status: OpportunityStatus,
        tasks: String,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        opportunities: Vec<TestOpportunity>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
            });
            self
        }

        pub fn opportunity(self, owner: &str, org_name: &str, title: &str) -> Self {
            self.opportunity_with(owner, org_name, title, OpportunityStatus::HaventStarted, "")
        }

        pub fn opportunity_with(
            mut self,
            owner: &str,
            org_name: &str,
            title: &str,
            status: OpportunityStatus,
            tasks: &str,
        ) -> Self {
            self.opportunities.push(TestOpportunity {
                owner: owner.to_string(),
                org_name: org_name.to_string(),
                title: title.to_string(),
                status,
                tasks: tasks.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut opportunity_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let name = format!("Test {}", user.username);
                let email = format!("{}@example.com", user.username);

                let user_id =
                    create_user(&pool, &name, &email, &user.username, STANDARD_PASSWORD).await?;

                user_id_map.insert(user.username.clone(), user_id);
            }

            for opp in &self.opportunities {
                let user_id = *user_id_map
                    .get(&opp.owner)
                    .expect("Opportunity owner was not registered in the builder");

                let fields = opportunity_fields(&opp.org_name, &opp.title, opp.status);
                let opp_id = create_opportunity(&pool, user_id, &fields, &opp.tasks).await?;

                opportunity_id_map.insert(opp.title.clone(), opp_id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                opportunity_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub opportunity_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn opportunity_id(&self, title: &str) -> Option<i64> {
            self.opportunity_id_map.get(title).copied()
        }

        /// Runs a COUNT(*) query with a single bound id.
        pub async fn count(&self, sql: &str, id: i64) -> i64 {
            sqlx::query_scalar::<_, i64>(sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .expect("Count query failed")
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .user("alice")
            .user("bob")
            .opportunity("alice", "Acme Corp", "Summer Internship")
            .build()
            .await
            .expect("Failed to build test DB")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = crate::init_rocket(test_db.pool.clone()).await;
        let client = Client::tracked(rocket).await.expect("valid rocket instance");

        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, username: &str, password: &str) {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": password
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
    }
}
