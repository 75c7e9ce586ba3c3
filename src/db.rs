use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite, Transaction};
use tracing::{info, instrument};

use crate::models::{
    ApplicationRecord, DbApplicationRecord, DbLink, DbMaterial, DbOpportunity, DbTask,
    DbTaskWithOpportunity, Link, Material, Opportunity, OpportunityFields, OpportunityStatus,
    Owned, Task, TaskStatus, TaskWithOpportunity,
};

/// The one ownership check. A row that is missing and a row that belongs to
/// another user are indistinguishable to the caller.
fn ensure_owned<T: Owned>(row: Option<T>, user_id: i64, entity: &str) -> Result<T, AppError> {
    match row {
        Some(row) if row.owner_id() == user_id => Ok(row),
        _ => Err(AppError::NotFound(format!("{} not found", entity))),
    }
}

/// Uppercases the first character, leaving the rest untouched.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Splits a comma-separated task list, trimming and capitalizing each entry
/// and dropping empties.
pub fn split_task_list(tasks: &str) -> Vec<String> {
    tasks
        .split(',')
        .map(|entry| capitalize(entry.trim()))
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

#[instrument(skip(pool, password))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    name: &str,
    email: &str,
    username: &str,
    password: &str,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Validation(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query("INSERT INTO users (name, email, username, password) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(username)
        .bind(&hashed_password)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Constraint(format!("Username '{}' already exists", username))
            } else {
                AppError::Database(e)
            }
        })?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Getting user by username");
    let row = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(User::from))
}

/// Uniform credential check: a missing user and a failed hash check are the
/// same `None` to the caller.
#[instrument(skip_all, fields(username = %username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => {
            let hash = user.password.clone().unwrap_or_default();
            match bcrypt::verify(password, &hash) {
                Ok(true) => Ok(Some(User::from(user))),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

#[instrument(skip(pool))]
pub async fn update_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    name: &str,
    email: &str,
    username: &str,
) -> Result<(), AppError> {
    info!("Updating user profile");
    let existing =
        sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ? AND id != ?")
            .bind(username)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    if existing.is_some() {
        return Err(AppError::Validation("Username already exists".to_string()));
    }

    sqlx::query("UPDATE users SET name = ?, email = ?, username = ? WHERE id = ?")
        .bind(name)
        .bind(email)
        .bind(username)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(&hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>("SELECT * FROM user_sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[instrument(skip(pool))]
pub async fn list_opportunities(
    pool: &Pool<Sqlite>,
    user_id: i64,
    status: Option<&str>,
    category: Option<&str>,
    sort_by: Option<&str>,
) -> Result<Vec<Opportunity>, AppError> {
    info!("Listing opportunities");

    let mut sql = String::from("SELECT * FROM opportunities WHERE user_id = ?");
    let mut binds: Vec<&str> = Vec::new();

    if let Some(status) = status {
        sql.push_str(" AND status = ?");
        binds.push(status);
    }
    if let Some(category) = category {
        sql.push_str(" AND category = ?");
        binds.push(category);
    }
    match sort_by {
        Some("app_deadline") => sql.push_str(" ORDER BY app_deadline DESC"),
        Some("personal_deadline") => sql.push_str(" ORDER BY personal_deadline DESC"),
        // Default is insertion order.
        _ => {}
    }

    let mut query = sqlx::query_as::<_, DbOpportunity>(&sql).bind(user_id);
    for bind in binds {
        query = query.bind(bind);
    }

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(Opportunity::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_opportunity(
    pool: &Pool<Sqlite>,
    id: i64,
    user_id: i64,
) -> Result<Opportunity, AppError> {
    info!("Fetching opportunity");
    let row = sqlx::query_as::<_, DbOpportunity>("SELECT * FROM opportunities WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    ensure_owned(row.map(Opportunity::from), user_id, "Opportunity")
}

/// Inserts one application-history row dated today. Callers gate this on a
/// true transition into "Applied".
async fn record_application(
    tx: &mut Transaction<'_, Sqlite>,
    opp_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    let today = Utc::now().date_naive();
    sqlx::query("INSERT INTO application_history (application_date, opp_id, user_id) VALUES (?, ?, ?)")
        .bind(today)
        .bind(opp_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn insert_task(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    opp_id: i64,
    description: &str,
) -> Result<i64, AppError> {
    let res = sqlx::query("INSERT INTO tasks (description, status, opp_id, user_id) VALUES (?, ?, ?, ?)")
        .bind(description)
        .bind(TaskStatus::NotDone.as_str())
        .bind(opp_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    Ok(res.last_insert_rowid())
}

fn bind_opportunity_fields<'q>(
    query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    fields: &'q OpportunityFields,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&fields.org_name)
        .bind(&fields.title)
        .bind(fields.app_deadline)
        .bind(fields.personal_deadline)
        .bind(&fields.requirements)
        .bind(&fields.link)
        .bind(&fields.short_description)
        .bind(&fields.category)
        .bind(fields.priority)
        .bind(fields.status.as_str())
        .bind(&fields.notes)
        .bind(&fields.other_info)
        .bind(&fields.contact_info)
        .bind(&fields.location)
}

#[instrument(skip(pool, fields, tasks))]
pub async fn create_opportunity(
    pool: &Pool<Sqlite>,
    user_id: i64,
    fields: &OpportunityFields,
    tasks: &str,
) -> Result<i64, AppError> {
    info!("Creating opportunity");

    let mut tx = pool.begin().await?;

    let insert = sqlx::query(
        "INSERT INTO opportunities
         (org_name, title, app_deadline, personal_deadline, requirements, link,
          short_description, category, priority, status, notes, other_info,
          contact_info, location, user_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    );
    let res = bind_opportunity_fields(insert, fields)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let opp_id = res.last_insert_rowid();

    if fields.status.is_applied() {
        record_application(&mut tx, opp_id, user_id).await?;
    }

    for description in split_task_list(tasks) {
        insert_task(&mut tx, user_id, opp_id, &description).await?;
    }

    tx.commit().await?;

    Ok(opp_id)
}

#[instrument(skip(pool, fields))]
pub async fn update_opportunity(
    pool: &Pool<Sqlite>,
    id: i64,
    user_id: i64,
    fields: &OpportunityFields,
) -> Result<(), AppError> {
    info!("Updating opportunity");

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, DbOpportunity>("SELECT * FROM opportunities WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let existing = ensure_owned(row.map(Opportunity::from), user_id, "Opportunity")?;

    let update = sqlx::query(
        "UPDATE opportunities
         SET org_name = ?, title = ?, app_deadline = ?, personal_deadline = ?,
             requirements = ?, link = ?, short_description = ?, category = ?,
             priority = ?, status = ?, notes = ?, other_info = ?,
             contact_info = ?, location = ?
         WHERE id = ?",
    );
    bind_opportunity_fields(update, fields)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if fields.status.is_applied() && !existing.status.is_applied() {
        record_application(&mut tx, id, user_id).await?;
    }

    tx.commit().await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_opportunity(pool: &Pool<Sqlite>, id: i64, user_id: i64) -> Result<(), AppError> {
    info!("Deleting opportunity");

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, DbOpportunity>("SELECT * FROM opportunities WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    ensure_owned(row.map(Opportunity::from), user_id, "Opportunity")?;

    // Tasks, materials and history rows go with it via ON DELETE CASCADE.
    sqlx::query("DELETE FROM opportunities WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

// Applying to an already-applied opportunity records nothing new.
#[instrument(skip(pool))]
pub async fn apply_to_opportunity(
    pool: &Pool<Sqlite>,
    id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    info!("Recording application");

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, DbOpportunity>("SELECT * FROM opportunities WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let existing = ensure_owned(row.map(Opportunity::from), user_id, "Opportunity")?;

    if !existing.status.is_applied() {
        record_application(&mut tx, id, user_id).await?;

        sqlx::query("UPDATE opportunities SET status = ? WHERE id = ?")
            .bind(OpportunityStatus::Applied.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn has_applied(pool: &Pool<Sqlite>, opp_id: i64) -> Result<bool, AppError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM application_history WHERE opp_id = ?")
            .bind(opp_id)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

#[instrument(skip(pool))]
pub async fn list_application_history(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<ApplicationRecord>, AppError> {
    info!("Listing application history");

    let rows = sqlx::query_as::<_, DbApplicationRecord>(
        "SELECT a.opp_id, o.title, o.org_name, o.link, a.application_date
         FROM application_history a
         JOIN opportunities o ON o.id = a.opp_id
         WHERE a.user_id = ?
         ORDER BY a.application_date DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ApplicationRecord::from).collect())
}

#[instrument(skip(pool, description))]
pub async fn add_task(
    pool: &Pool<Sqlite>,
    user_id: i64,
    opp_id: i64,
    description: &str,
) -> Result<i64, AppError> {
    info!("Adding task");

    let description = capitalize(description.trim());
    if description.is_empty() {
        return Err(AppError::Validation(
            "Task description cannot be empty".to_string(),
        ));
    }

    // The parent opportunity must exist and belong to the same user.
    get_opportunity(pool, opp_id, user_id).await?;

    let mut tx = pool.begin().await?;
    let id = insert_task(&mut tx, user_id, opp_id, &description).await?;
    tx.commit().await?;

    Ok(id)
}

#[instrument(skip(pool))]
pub async fn list_tasks(
    pool: &Pool<Sqlite>,
    user_id: i64,
    status: Option<TaskStatus>,
) -> Result<Vec<TaskWithOpportunity>, AppError> {
    info!("Listing tasks");

    let mut sql = String::from(
        "SELECT t.id, t.description, t.status, t.opp_id, o.title AS opp_title, t.created_at
         FROM tasks t
         JOIN opportunities o ON o.id = t.opp_id
         WHERE t.user_id = ?",
    );
    if status.is_some() {
        sql.push_str(" AND t.status = ?");
    }

    let mut query = sqlx::query_as::<_, DbTaskWithOpportunity>(&sql).bind(user_id);
    if let Some(status) = status {
        query = query.bind(status.as_str().to_owned());
    }

    let rows = query.fetch_all(pool).await?;

    Ok(rows.into_iter().map(TaskWithOpportunity::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_tasks_for_opportunity(
    pool: &Pool<Sqlite>,
    opp_id: i64,
) -> Result<Vec<Task>, AppError> {
    let rows = sqlx::query_as::<_, DbTask>("SELECT * FROM tasks WHERE opp_id = ?")
        .bind(opp_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Task::from).collect())
}

#[instrument(skip(pool))]
pub async fn set_task_status(
    pool: &Pool<Sqlite>,
    id: i64,
    user_id: i64,
    done: bool,
) -> Result<(), AppError> {
    info!("Setting task status");

    let row = sqlx::query_as::<_, DbTask>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    ensure_owned(row.map(Task::from), user_id, "Task")?;

    sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
        .bind(TaskStatus::from_done(done).as_str())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn create_material(
    pool: &Pool<Sqlite>,
    user_id: i64,
    opp_id: Option<i64>,
    title: &str,
    file: &str,
) -> Result<i64, AppError> {
    info!("Creating material");

    // A linked opportunity must belong to the same user.
    if let Some(opp_id) = opp_id {
        get_opportunity(pool, opp_id, user_id).await?;
    }

    let res = sqlx::query("INSERT INTO materials (title, file, opp_id, user_id) VALUES (?, ?, ?, ?)")
        .bind(title)
        .bind(file)
        .bind(opp_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_materials(pool: &Pool<Sqlite>, user_id: i64) -> Result<Vec<Material>, AppError> {
    info!("Listing materials");

    let rows = sqlx::query_as::<_, DbMaterial>("SELECT * FROM materials WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Material::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_materials_for_opportunity(
    pool: &Pool<Sqlite>,
    opp_id: i64,
) -> Result<Vec<Material>, AppError> {
    let rows = sqlx::query_as::<_, DbMaterial>("SELECT * FROM materials WHERE opp_id = ?")
        .bind(opp_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Material::from).collect())
}

#[instrument(skip(pool))]
pub async fn update_material(
    pool: &Pool<Sqlite>,
    id: i64,
    user_id: i64,
    title: &str,
    file: Option<&str>,
) -> Result<(), AppError> {
    info!("Updating material");

    let row = sqlx::query_as::<_, DbMaterial>("SELECT * FROM materials WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    ensure_owned(row.map(Material::from), user_id, "Material")?;

    match file {
        Some(file) => {
            sqlx::query("UPDATE materials SET title = ?, file = ? WHERE id = ?")
                .bind(title)
                .bind(file)
                .bind(id)
                .execute(pool)
                .await?;
        }
        None => {
            sqlx::query("UPDATE materials SET title = ? WHERE id = ?")
                .bind(title)
                .bind(id)
                .execute(pool)
                .await?;
        }
    }

    Ok(())
}

/// Deletes the row and returns it so the caller can unlink the stored file.
#[instrument(skip(pool))]
pub async fn delete_material(
    pool: &Pool<Sqlite>,
    id: i64,
    user_id: i64,
) -> Result<Material, AppError> {
    info!("Deleting material");

    let row = sqlx::query_as::<_, DbMaterial>("SELECT * FROM materials WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let material = ensure_owned(row.map(Material::from), user_id, "Material")?;

    sqlx::query("DELETE FROM materials WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(material)
}

#[instrument(skip(pool))]
pub async fn create_link(
    pool: &Pool<Sqlite>,
    user_id: i64,
    title: &str,
    url: &str,
) -> Result<i64, AppError> {
    info!("Creating link");

    let res = sqlx::query("INSERT INTO links (title, url, user_id) VALUES (?, ?, ?)")
        .bind(title)
        .bind(url)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_links(pool: &Pool<Sqlite>, user_id: i64) -> Result<Vec<Link>, AppError> {
    info!("Listing links");

    let rows = sqlx::query_as::<_, DbLink>("SELECT * FROM links WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Link::from).collect())
}

#[instrument(skip(pool))]
pub async fn update_link(
    pool: &Pool<Sqlite>,
    id: i64,
    user_id: i64,
    title: &str,
    url: &str,
) -> Result<(), AppError> {
    info!("Updating link");

    let row = sqlx::query_as::<_, DbLink>("SELECT * FROM links WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    ensure_owned(row.map(Link::from), user_id, "Link")?;

    sqlx::query("UPDATE links SET title = ?, url = ? WHERE id = ?")
        .bind(title)
        .bind(url)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_link(pool: &Pool<Sqlite>, id: i64, user_id: i64) -> Result<(), AppError> {
    info!("Deleting link");

    let row = sqlx::query_as::<_, DbLink>("SELECT * FROM links WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    ensure_owned(row.map(Link::from), user_id, "Link")?;

    sqlx::query("DELETE FROM links WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
