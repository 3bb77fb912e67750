// handlers/directory.rs - cities, institutions, benefits, criteria, criterion types
//
// One set of handlers serves every DirectoryKind; `routes` binds them per kind.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::database::{new_id, BenefitLink, DirectoryEntry, DirectoryKind};
use crate::error::DomainError;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub city_id: Option<String>,
    pub criterion_type_id: Option<String>,
}

impl EntryRequest {
    fn parent_id(&self, kind: DirectoryKind) -> Option<&str> {
        match kind {
            DirectoryKind::Institution => self.city_id.as_deref(),
            DirectoryKind::Criterion => self.criterion_type_id.as_deref(),
            _ => None,
        }
    }
}

/// `/api/{segment}` and `/api/{segment}/:id` for one kind.
pub fn routes(kind: DirectoryKind) -> Router<AppState> {
    let collection = format!("/api/{}", kind.segment());
    let item = format!("{}/:id", collection);

    Router::new()
        .route(
            &collection,
            get(move |State(state): State<AppState>| list(state, kind)).post(
                move |State(state): State<AppState>, Json(body): Json<EntryRequest>| create(state, kind, body),
            ),
        )
        .route(
            &item,
            get(move |State(state): State<AppState>, Path(id): Path<String>| show(state, kind, id))
                .put(
                    move |State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<EntryRequest>| {
                        update(state, kind, id, body)
                    },
                )
                .delete(move |State(state): State<AppState>, Path(id): Path<String>| delete(state, kind, id)),
        )
}

/// `POST /api/benefits/:id/{cities,institutions,criteria}/:target`
pub fn link_routes() -> Router<AppState> {
    BenefitLink::ALL.iter().fold(Router::new(), |router, &link| {
        router.route(
            &format!("/api/benefits/:id/{}/:target", link.target().segment()),
            post(
                move |State(state): State<AppState>, Path((id, target)): Path<(String, String)>| {
                    add_link(state, link, id, target)
                },
            ),
        )
    })
}

fn not_found(kind: DirectoryKind) -> DomainError {
    DomainError::NotFound(kind.label().to_string())
}

/// Benefits also carry the ids of their linked cities, institutions and criteria.
async fn render(state: &AppState, kind: DirectoryKind, entry: &DirectoryEntry) -> Result<Value, DomainError> {
    let mut value = entry.to_json(kind);

    if kind == DirectoryKind::Benefit {
        if let Value::Object(map) = &mut value {
            for link in BenefitLink::ALL {
                let ids = state.store.linked_ids(link, &entry.id).await?;
                map.insert(link.field().to_string(), json!(ids));
            }
        }
    }

    Ok(value)
}

async fn load(state: &AppState, kind: DirectoryKind, id: &str) -> Result<DirectoryEntry, DomainError> {
    state.store.find_entry(kind, id).await?.ok_or_else(|| not_found(kind))
}

async fn checked_parent(
    state: &AppState,
    kind: DirectoryKind,
    parent_id: Option<&str>,
) -> Result<Option<String>, DomainError> {
    let Some(parent) = kind.parent() else {
        return Ok(None);
    };
    let field = kind.parent_field().unwrap_or("parentId");

    let id = parent_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DomainError::Validation(format!("{} is required", field)))?;

    if !state.store.entry_exists(parent, id).await? {
        return Err(not_found(parent));
    }
    Ok(Some(id.to_string()))
}

fn required_name(name: Option<&str>) -> Result<String, DomainError> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(DomainError::Validation("Name must not be empty".to_string())),
    }
}

pub async fn list(state: AppState, kind: DirectoryKind) -> ApiResult<Vec<Value>> {
    let entries = state.store.list_entries(kind).await?;

    let mut rendered = Vec::with_capacity(entries.len());
    for entry in &entries {
        rendered.push(render(&state, kind, entry).await?);
    }
    Ok(ApiResponse::success(rendered))
}

pub async fn show(state: AppState, kind: DirectoryKind, id: String) -> ApiResult<Value> {
    let entry = load(&state, kind, &id).await?;
    Ok(ApiResponse::success(render(&state, kind, &entry).await?))
}

pub async fn create(state: AppState, kind: DirectoryKind, body: EntryRequest) -> ApiResult<Value> {
    let name = required_name(body.name.as_deref())?;
    if state.store.name_exists(kind, &name).await? {
        return Err(DomainError::AlreadyExists(kind.label().to_string()).into());
    }

    let entry = DirectoryEntry {
        id: new_id(),
        name,
        description: if kind.has_description() { body.description.clone() } else { None },
        parent_id: checked_parent(&state, kind, body.parent_id(kind)).await?,
    };
    state.store.insert_entry(kind, &entry).await?;

    info!(id = %entry.id, "{} created", kind.label());
    Ok(ApiResponse::created(render(&state, kind, &entry).await?))
}

pub async fn update(state: AppState, kind: DirectoryKind, id: String, body: EntryRequest) -> ApiResult<Value> {
    let mut entry = load(&state, kind, &id).await?;

    if body.name.is_some() {
        let name = required_name(body.name.as_deref())?;
        if !name.eq_ignore_ascii_case(&entry.name) && state.store.name_exists(kind, &name).await? {
            return Err(DomainError::AlreadyExists(kind.label().to_string()).into());
        }
        entry.name = name;
    }
    if kind.has_description() && body.description.is_some() {
        entry.description = body.description.clone();
    }
    if body.parent_id(kind).is_some() {
        entry.parent_id = checked_parent(&state, kind, body.parent_id(kind)).await?;
    }

    if !state.store.update_entry(kind, &entry).await? {
        return Err(not_found(kind).into());
    }
    Ok(ApiResponse::success(render(&state, kind, &entry).await?))
}

/// Refused while institutions or criteria still point at the entry.
pub async fn delete(state: AppState, kind: DirectoryKind, id: String) -> ApiResult<()> {
    load(&state, kind, &id).await?;

    for child in kind.children() {
        if state.store.has_children(child, &id).await? {
            return Err(DomainError::InUse(kind.label().to_string()).into());
        }
    }

    if !state.store.delete_entry(kind, &id).await? {
        return Err(not_found(kind).into());
    }

    info!(%id, "{} deleted", kind.label());
    Ok(ApiResponse::no_content())
}

pub async fn add_link(state: AppState, link: BenefitLink, benefit_id: String, target_id: String) -> ApiResult<Value> {
    let benefit = load(&state, DirectoryKind::Benefit, &benefit_id).await?;
    if !state.store.entry_exists(link.target(), &target_id).await? {
        return Err(not_found(link.target()).into());
    }
    if state.store.link_exists(link, &benefit_id, &target_id).await? {
        return Err(DomainError::AlreadyExists(format!("Benefit {} link", link.target().label())).into());
    }

    state.store.insert_link(link, &benefit_id, &target_id).await?;
    info!(benefit_id = %benefit_id, target_id = %target_id, "Benefit linked to {}", link.target().label());
    Ok(ApiResponse::created(render(&state, DirectoryKind::Benefit, &benefit).await?))
}
