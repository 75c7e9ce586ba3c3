use rocket::FromForm;
use rocket::State;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::response::Redirect;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{User, UserSession};
use crate::db::{
    add_task, apply_to_opportunity, authenticate_user, create_link, create_material,
    create_opportunity, create_user, create_user_session, delete_link, delete_material,
    delete_opportunity, find_user_by_username, get_materials_for_opportunity, get_opportunity,
    get_tasks_for_opportunity, has_applied, invalidate_session, list_application_history,
    list_links, list_materials, list_opportunities, list_tasks, set_task_status, update_link,
    update_material, update_opportunity, update_profile, update_user_password,
};
use crate::models::{
    ApplicationRecord, Link, Material, Opportunity, OpportunityFields, OpportunityStatus, Task,
    TaskStatus, TaskWithOpportunity,
};
use crate::uploads::{UploadConfig, remove_stored_file, store_upload};
use crate::validation::AppErrorExt;
use crate::validation::JsonValidateExt;
use crate::validation::ToValidationResponse;
use crate::validation::ValidationResponse;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
    pub redirect_url: Option<String>,
}

impl LoginResponse {
    // One failure shape for every bad login, whatever actually went wrong.
    fn failure() -> Self {
        Self {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
            redirect_url: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub username: String,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    use chrono::Utc;
    use rocket::http::{Cookie, SameSite};

    // Missing fields fail exactly like bad credentials.
    if login.username.is_empty() || login.password.is_empty() {
        return Ok(Json(LoginResponse::failure()));
    }

    match authenticate_user(db, &login.username, &login.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("logged_in", login.username.clone()))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
                redirect_url: Some("/".to_string()),
            }))
        }
        None => Ok(Json(LoginResponse::failure())),
    }
}

#[derive(Deserialize, Validate, Clone)]
pub struct RegisterRequest {
    name: String,
    email: String,
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    #[validate(
        length(min = 1, message = "Password is required"),
        must_match(other = "confirm", message = "Passwords must match")
    )]
    password: String,
    #[validate(length(min = 1, message = "Password confirmation is required"))]
    confirm: String,
}

#[post("/register", data = "<registration>")]
pub async fn api_register(
    registration: Json<RegisterRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = registration.validate_custom()?;

    let existing_user = find_user_by_username(db, &validated.username)
        .await
        .validate_custom()?;

    if existing_user.is_some() {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "username",
                "Username already exists",
            )),
        ));
    }

    create_user(
        db,
        &validated.name,
        &validated.email,
        &validated.username,
        &validated.password,
    )
    .await
    .validate_custom()?;

    Ok(Status::Created)
}

#[get("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Redirect {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));
    cookies.remove_private(rocket::http::Cookie::build("user_id"));
    cookies.remove_private(rocket::http::Cookie::build("logged_in"));

    Redirect::to("/login")
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[derive(Deserialize, Validate, Clone)]
pub struct ProfileUpdateRequest {
    name: String,
    email: String,
    #[validate(length(min = 1, message = "Username is required"))]
    username: String,
    password: Option<String>,
}

#[put("/profile", data = "<profile>")]
pub async fn api_update_profile(
    profile: Json<ProfileUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = profile.validate_custom()?;

    update_profile(
        db,
        user.id,
        &validated.name,
        &validated.email,
        &validated.username,
    )
    .await
    .validate_custom()?;

    if let Some(password) = &validated.password {
        if !password.is_empty() {
            update_user_password(db, user.id, password)
                .await
                .validate_custom()?;
        }
    }

    Ok(Status::Ok)
}

#[derive(Serialize, Deserialize)]
pub struct OpportunityResponse {
    pub id: i64,
    pub org_name: String,
    pub title: String,
    pub app_deadline: String,
    pub personal_deadline: String,
    pub requirements: String,
    pub link: String,
    pub short_description: String,
    pub category: String,
    pub priority: i64,
    pub status: String,
    pub notes: String,
    pub other_info: String,
    pub contact_info: String,
    pub location: String,
    pub created_at: String,
}

impl From<Opportunity> for OpportunityResponse {
    fn from(opp: Opportunity) -> Self {
        Self {
            id: opp.id,
            org_name: opp.org_name,
            title: opp.title,
            app_deadline: opp.app_deadline.to_string(),
            personal_deadline: opp.personal_deadline.to_string(),
            requirements: opp.requirements,
            link: opp.link,
            short_description: opp.short_description,
            category: opp.category,
            priority: opp.priority,
            status: opp.status.to_string(),
            notes: opp.notes,
            other_info: opp.other_info,
            contact_info: opp.contact_info,
            location: opp.location,
            created_at: opp.created_at.to_rfc3339(),
        }
    }
}

#[derive(FromForm)]
pub struct OpportunityQueryParams {
    status: Option<String>,
    category: Option<String>,
    sort_by: Option<String>,
}

#[get("/opportunities?<params..>")]
pub async fn api_list_opportunities(
    params: OpportunityQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<OpportunityResponse>>, Status> {
    let opportunities = list_opportunities(
        db,
        user.id,
        params.status.as_deref(),
        params.category.as_deref(),
        params.sort_by.as_deref(),
    )
    .await?;

    Ok(Json(
        opportunities
            .into_iter()
            .map(OpportunityResponse::from)
            .collect(),
    ))
}

#[derive(Deserialize, Validate, Clone)]
pub struct OpportunitySaveRequest {
    #[validate(length(min = 1, message = "Organisation name is required"))]
    org_name: String,
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
    app_deadline: chrono::NaiveDate,
    personal_deadline: chrono::NaiveDate,
    #[serde(default)]
    requirements: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    short_description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    status: OpportunityStatus,
    #[serde(default)]
    notes: String,
    #[serde(default)]
    other_info: String,
    #[serde(default)]
    contact_info: String,
    #[serde(default)]
    location: String,
    /// Comma-separated initial task list, used at creation only.
    #[serde(default)]
    tasks: String,
}

impl OpportunitySaveRequest {
    fn fields(&self) -> OpportunityFields {
        OpportunityFields {
            org_name: self.org_name.clone(),
            title: self.title.clone(),
            app_deadline: self.app_deadline,
            personal_deadline: self.personal_deadline,
            requirements: self.requirements.clone(),
            link: self.link.clone(),
            short_description: self.short_description.clone(),
            category: self.category.clone(),
            priority: self.priority,
            status: self.status,
            notes: self.notes.clone(),
            other_info: self.other_info.clone(),
            contact_info: self.contact_info.clone(),
            location: self.location.clone(),
        }
    }
}

#[post("/opportunities", data = "<request>")]
pub async fn api_create_opportunity(
    request: Json<OpportunitySaveRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CreatedResponse>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let id = create_opportunity(db, user.id, &validated.fields(), &validated.tasks)
        .await
        .validate_custom()?;

    Ok(Json(CreatedResponse { id }))
}

#[derive(Serialize, Deserialize)]
pub struct TaskItem {
    pub id: i64,
    pub description: String,
    pub status: String,
}

impl From<Task> for TaskItem {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            description: task.description,
            status: task.status.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct MaterialResponse {
    pub id: i64,
    pub title: String,
    pub file: String,
    pub opp_id: Option<i64>,
    pub created_at: String,
}

impl From<Material> for MaterialResponse {
    fn from(material: Material) -> Self {
        Self {
            id: material.id,
            title: material.title,
            file: material.file,
            opp_id: material.opp_id,
            created_at: material.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct OpportunityDetailResponse {
    pub opportunity: OpportunityResponse,
    pub tasks: Vec<TaskItem>,
    pub materials: Vec<MaterialResponse>,
    pub applied: bool,
}

#[get("/opportunities/<id>")]
pub async fn api_view_opportunity(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OpportunityDetailResponse>, Status> {
    let opportunity = get_opportunity(db, id, user.id).await?;
    let tasks = get_tasks_for_opportunity(db, id).await?;
    let materials = get_materials_for_opportunity(db, id).await?;
    let applied = has_applied(db, id).await?;

    Ok(Json(OpportunityDetailResponse {
        opportunity: OpportunityResponse::from(opportunity),
        tasks: tasks.into_iter().map(TaskItem::from).collect(),
        materials: materials.into_iter().map(MaterialResponse::from).collect(),
        applied,
    }))
}

#[put("/opportunities/<id>", data = "<request>")]
pub async fn api_update_opportunity(
    id: i64,
    request: Json<OpportunitySaveRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    update_opportunity(db, id, user.id, &validated.fields())
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

#[delete("/opportunities/<id>")]
pub async fn api_delete_opportunity(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    delete_opportunity(db, id, user.id).await?;

    Ok(Status::Ok)
}

#[post("/opportunities/<id>/apply")]
pub async fn api_apply_to_opportunity(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    apply_to_opportunity(db, id, user.id).await?;

    Ok(Status::Ok)
}

#[derive(Serialize, Deserialize)]
pub struct CalendarEvent {
    pub opp_id: i64,
    pub title: String,
    pub date: String,
    pub color: String,
}

#[get("/calendar")]
pub async fn api_calendar(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<CalendarEvent>>, Status> {
    let opportunities = list_opportunities(db, user.id, None, None, None).await?;

    let mut events = Vec::with_capacity(opportunities.len() * 2);
    for opp in opportunities {
        let title = format!("{}, {}", opp.title, opp.org_name);
        events.push(CalendarEvent {
            opp_id: opp.id,
            title: title.clone(),
            date: opp.app_deadline.to_string(),
            color: "red".to_string(),
        });
        events.push(CalendarEvent {
            opp_id: opp.id,
            title,
            date: opp.personal_deadline.to_string(),
            color: "blue".to_string(),
        });
    }

    Ok(Json(events))
}

#[derive(Serialize, Deserialize)]
pub struct ApplicationHistoryResponse {
    pub opp_id: i64,
    pub title: String,
    pub org_name: String,
    pub link: String,
    pub application_date: String,
}

impl From<ApplicationRecord> for ApplicationHistoryResponse {
    fn from(record: ApplicationRecord) -> Self {
        Self {
            opp_id: record.opp_id,
            title: record.title,
            org_name: record.org_name,
            link: record.link,
            application_date: record.application_date.to_string(),
        }
    }
}

#[get("/history")]
pub async fn api_application_history(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ApplicationHistoryResponse>>, Status> {
    let records = list_application_history(db, user.id).await?;

    Ok(Json(
        records
            .into_iter()
            .map(ApplicationHistoryResponse::from)
            .collect(),
    ))
}

#[derive(Deserialize, Validate, Clone)]
pub struct TaskCreateRequest {
    opp_id: i64,
    #[validate(length(min = 1, message = "Task description is required"))]
    description: String,
}

#[post("/tasks", data = "<request>")]
pub async fn api_add_task(
    request: Json<TaskCreateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CreatedResponse>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let id = add_task(db, user.id, validated.opp_id, &validated.description)
        .await
        .validate_custom()?;

    Ok(Json(CreatedResponse { id }))
}

#[derive(Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: i64,
    pub description: String,
    pub status: String,
    pub opp_id: i64,
    pub opp_title: String,
    pub created_at: String,
}

impl From<TaskWithOpportunity> for TaskResponse {
    fn from(task: TaskWithOpportunity) -> Self {
        Self {
            id: task.id,
            description: task.description,
            status: task.status.to_string(),
            opp_id: task.opp_id,
            opp_title: task.opp_title,
            created_at: task.created_at.to_rfc3339(),
        }
    }
}

#[derive(FromForm)]
pub struct TasksQueryParams {
    filter: Option<String>,
}

#[get("/tasks?<params..>")]
pub async fn api_list_tasks(
    params: TasksQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<TaskResponse>>, Status> {
    // An unrecognized filter value is treated as no filter.
    let status = params
        .filter
        .as_deref()
        .and_then(|f| TaskStatus::from_str(f).ok());

    let tasks = list_tasks(db, user.id, status).await?;

    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct TaskStatusUpdateRequest {
    done: bool,
}

#[put("/tasks/<id>/status", data = "<request>")]
pub async fn api_update_task_status(
    id: i64,
    request: Json<TaskStatusUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    set_task_status(db, id, user.id, request.done).await?;

    Ok(Status::Ok)
}

#[derive(FromForm)]
pub struct MaterialUploadForm<'f> {
    title: String,
    opp_id: Option<i64>,
    file: TempFile<'f>,
}

#[post("/materials", data = "<form>")]
pub async fn api_upload_material(
    form: Form<MaterialUploadForm<'_>>,
    user: User,
    uploads: &State<UploadConfig>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CreatedResponse>, Custom<Json<ValidationResponse>>> {
    let mut form = form.into_inner();

    let stored = store_upload(uploads, &mut form.file)
        .await
        .validate_custom()?;

    let id = match create_material(db, user.id, form.opp_id, &form.title, &stored).await {
        Ok(id) => id,
        Err(err) => {
            // Don't leave the stored file behind if the row never existed.
            remove_stored_file(uploads, &stored).await;
            return Err(err.to_validation_response());
        }
    };

    Ok(Json(CreatedResponse { id }))
}

#[get("/materials")]
pub async fn api_list_materials(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<MaterialResponse>>, Status> {
    let materials = list_materials(db, user.id).await?;

    Ok(Json(
        materials.into_iter().map(MaterialResponse::from).collect(),
    ))
}

#[derive(FromForm)]
pub struct MaterialEditForm<'f> {
    title: String,
    file: Option<TempFile<'f>>,
}

#[put("/materials/<id>", data = "<form>")]
pub async fn api_edit_material(
    id: i64,
    form: Form<MaterialEditForm<'_>>,
    user: User,
    uploads: &State<UploadConfig>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let mut form = form.into_inner();

    let stored = match form.file.as_mut() {
        Some(file) => Some(store_upload(uploads, file).await.validate_custom()?),
        None => None,
    };

    if let Err(err) = update_material(db, id, user.id, &form.title, stored.as_deref()).await {
        if let Some(stored) = &stored {
            remove_stored_file(uploads, stored).await;
        }
        return Err(err.to_validation_response());
    }

    Ok(Status::Ok)
}

#[delete("/materials/<id>")]
pub async fn api_delete_material(
    id: i64,
    user: User,
    uploads: &State<UploadConfig>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    let material = delete_material(db, id, user.id).await?;

    remove_stored_file(uploads, &material.file).await;

    Ok(Status::Ok)
}

#[derive(Serialize, Deserialize)]
pub struct LinkResponse {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub created_at: String,
}

impl From<Link> for LinkResponse {
    fn from(link: Link) -> Self {
        Self {
            id: link.id,
            title: link.title,
            url: link.url,
            created_at: link.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize, Validate, Clone)]
pub struct LinkSaveRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    title: String,
    #[validate(url(message = "Must be a valid URL"))]
    url: String,
}

#[post("/links", data = "<request>")]
pub async fn api_create_link(
    request: Json<LinkSaveRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CreatedResponse>, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    let id = create_link(db, user.id, &validated.title, &validated.url)
        .await
        .validate_custom()?;

    Ok(Json(CreatedResponse { id }))
}

#[get("/links")]
pub async fn api_list_links(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<LinkResponse>>, Status> {
    let links = list_links(db, user.id).await?;

    Ok(Json(links.into_iter().map(LinkResponse::from).collect()))
}

#[put("/links/<id>", data = "<request>")]
pub async fn api_edit_link(
    id: i64,
    request: Json<LinkSaveRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = request.validate_custom()?;

    update_link(db, id, user.id, &validated.title, &validated.url)
        .await
        .validate_custom()?;

    Ok(Status::Ok)
}

#[delete("/links/<id>")]
pub async fn api_delete_link(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    delete_link(db, id, user.id).await?;

    Ok(Status::Ok)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
