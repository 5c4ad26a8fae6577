use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use fete_db::EventFilter;
use fete_types::api::{
    CategoryStat, CategoryStatsBody, Claims, Envelope, EventBody, EventInput, EventListBody, EventQuery,
    MessageBody, Pagination,
};
use fete_types::models::EventCategory;

use crate::error::{ApiError, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::{AppState, with_db};

const DEFAULT_LIMIT: u32 = 12;
const MAX_LIMIT: u32 = 100;

/// Resolve `page`/`limit` query values into (page, limit, offset).
pub(crate) fn paging(page: Option<u32>, limit: Option<u32>, default_limit: u32, max_limit: u32) -> (u32, u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(default_limit).clamp(1, max_limit);
    (page, limit, (page - 1).saturating_mul(limit))
}

pub async fn list_events(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<EventQuery>,
) -> ApiResult<impl IntoResponse> {
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.is_empty() && *c != "all")
        .map(|c| c.parse::<EventCategory>())
        .transpose()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let filter = EventFilter {
        category,
        featured_only: query.featured.unwrap_or(false),
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
    };
    let (page, limit, offset) = paging(query.page, query.limit, DEFAULT_LIMIT, MAX_LIMIT);

    let (events, total) = with_db(&state, move |s| Ok(s.db.list_events(&filter, offset, limit)?)).await?;

    Ok(Json(Envelope::ok(EventListBody { events, pagination: Pagination::new(page, limit, total) })))
}

pub async fn category_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = with_db(&state, |s| Ok(s.db.category_stats()?)).await?;
    let stats = stats
        .into_iter()
        .map(|(category, count)| CategoryStat { category, count })
        .collect();

    Ok(Json(Envelope::ok(CategoryStatsBody { stats })))
}

pub async fn get_event(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let event = with_db(&state, move |s| Ok(s.db.get_active_event(id)?))
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;

    Ok(Json(Envelope::ok(EventBody { event })))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(input): ApiJson<EventInput>,
) -> ApiResult<impl IntoResponse> {
    let input = validate(input)?;
    let id = Uuid::new_v4();
    let author = claims.sub;

    let event = with_db(&state, move |s| Ok(s.db.insert_event(id, author, &input)?)).await?;

    info!("{} created event {} ({})", claims.email, event.title, event.id);
    Ok((StatusCode::CREATED, Json(Envelope::ok(EventBody { event }))))
}

pub async fn update_event(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<EventInput>,
) -> ApiResult<impl IntoResponse> {
    let input = validate(input)?;

    let event = with_db(&state, move |s| Ok(s.db.replace_event(id, &input)?))
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;

    Ok(Json(Envelope::ok(EventBody { event })))
}

/// Soft delete: the record stays but drops out of listing and fetch.
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let removed = with_db(&state, move |s| Ok(s.db.deactivate_event(id)?)).await?;
    if !removed {
        return Err(ApiError::not_found("Event"));
    }

    info!("{} deactivated event {}", claims.email, id);
    Ok(Json(Envelope::ok(MessageBody { message: "Event deleted successfully".into() })))
}

fn validate(mut input: EventInput) -> ApiResult<EventInput> {
    input.title = input.title.trim().to_string();
    if input.title.is_empty() {
        return Err(ApiError::validation("Title is required"));
    }
    if input.description.trim().is_empty() {
        return Err(ApiError::validation("Description is required"));
    }
    if let Some(testimonial) = &input.testimonial {
        if !(1..=5).contains(&testimonial.rating) {
            return Err(ApiError::validation("Testimonial rating must be between 1 and 5"));
        }
    }
    if let (Some(min), Some(max)) = (input.details.budget.min, input.details.budget.max) {
        if min > max {
            return Err(ApiError::validation("Budget minimum exceeds maximum"));
        }
    }
    input.tags = input
        .tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> EventInput {
        serde_json::from_value(serde_json::json!({
            "title": "  Garden Wedding ",
            "description": "Sixty guests under the oaks",
            "category": "formal",
            "tags": ["Outdoor", " "]
        }))
        .unwrap()
    }

    #[test]
    fn paging_defaults_and_bounds() {
        assert_eq!(paging(None, None, 12, 100), (1, 12, 0));
        assert_eq!(paging(Some(3), Some(10), 12, 100), (3, 10, 20));
        assert_eq!(paging(Some(0), Some(1000), 12, 100), (1, 100, 0));
        assert_eq!(paging(None, Some(0), 12, 100), (1, 1, 0));
    }

    #[test]
    fn validation_normalizes_title_and_tags() {
        let event = validate(input()).unwrap();
        assert_eq!(event.title, "Garden Wedding");
        assert_eq!(event.tags, vec!["outdoor".to_string()]);
        assert!(event.is_active);
    }

    #[test]
    fn rating_out_of_range_is_rejected() {
        let mut event = input();
        event.testimonial = Some(serde_json::from_value(serde_json::json!({
            "clientName": "Ana", "rating": 6
        })).unwrap());
        assert!(matches!(validate(event), Err(ApiError::Validation(_))));
    }
}
