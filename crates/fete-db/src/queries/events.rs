use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use fete_types::api::EventInput;
use fete_types::models::{EventCategory, PortfolioEvent};

use super::{col, escape_like, json_col, opt_json_col, to_json};
use crate::Database;
use crate::models::EventFilter;

const EVENT_SELECT: &str = "SELECT e.id, e.title, e.description, e.category, e.images, e.details, e.services,
        e.testimonial, e.tags, e.is_active, e.is_featured, e.created_by, u.name,
        e.created_at, e.updated_at
 FROM events e
 LEFT JOIN users u ON u.id = e.created_by";

impl Database {
    pub fn insert_event(&self, id: Uuid, created_by: Uuid, input: &EventInput) -> Result<PortfolioEvent> {
        let now = Utc::now();
        let encoded = EncodedEvent::new(input)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO events (id, title, description, category, images, details, services,
                                     testimonial, tags, is_active, is_featured, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                rusqlite::params![
                    id.to_string(),
                    input.title,
                    input.description,
                    input.category.as_str(),
                    encoded.images,
                    encoded.details,
                    encoded.services,
                    encoded.testimonial,
                    encoded.tags,
                    input.is_active,
                    input.is_featured,
                    created_by.to_string(),
                    now,
                ],
            )?;
            query_event(conn, id, false)?
                .ok_or_else(|| anyhow::anyhow!("event {} vanished after insert", id))
        })
    }

    /// Full-record replace. Returns `None` when the id does not exist.
    pub fn replace_event(&self, id: Uuid, input: &EventInput) -> Result<Option<PortfolioEvent>> {
        let encoded = EncodedEvent::new(input)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE events SET
                    title = ?2, description = ?3, category = ?4, images = ?5, details = ?6,
                    services = ?7, testimonial = ?8, tags = ?9, is_active = ?10, is_featured = ?11,
                    updated_at = ?12
                 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    input.title,
                    input.description,
                    input.category.as_str(),
                    encoded.images,
                    encoded.details,
                    encoded.services,
                    encoded.testimonial,
                    encoded.tags,
                    input.is_active,
                    input.is_featured,
                    Utc::now(),
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_event(conn, id, false)
        })
    }

    /// Soft delete. Returns false when the event is missing or already inactive.
    pub fn deactivate_event(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE events SET is_active = 0, updated_at = ?2 WHERE id = ?1 AND is_active = 1",
                rusqlite::params![id.to_string(), Utc::now()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Fetch a single event that is still active.
    pub fn get_active_event(&self, id: Uuid) -> Result<Option<PortfolioEvent>> {
        self.with_conn(|conn| query_event(conn, id, true))
    }

    /// Active events matching `filter`, featured first then newest first.
    pub fn list_events(&self, filter: &EventFilter, offset: u32, limit: u32) -> Result<(Vec<PortfolioEvent>, u64)> {
        let (clause, mut params) = filter_clause(filter);
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM events e WHERE {clause}"),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let n = params.len();
            params.push(Value::Integer(i64::from(limit)));
            params.push(Value::Integer(i64::from(offset)));
            let sql = format!(
                "{EVENT_SELECT} WHERE {clause}
                 ORDER BY e.is_featured DESC, e.created_at DESC
                 LIMIT ?{} OFFSET ?{}",
                n + 1,
                n + 2
            );
            let mut stmt = conn.prepare(&sql)?;
            let events = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_event)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((events, total as u64))
        })
    }

    /// Active event counts per category, largest first.
    pub fn category_stats(&self) -> Result<Vec<(EventCategory, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) AS n FROM events
                 WHERE is_active = 1
                 GROUP BY category
                 ORDER BY n DESC, category ASC",
            )?;
            let stats = stmt
                .query_map([], |row| Ok((col::<EventCategory>(row, 0)?, row.get::<_, i64>(1)? as u64)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(stats)
        })
    }
}

struct EncodedEvent {
    images: String,
    details: String,
    services: String,
    testimonial: Option<String>,
    tags: String,
}

impl EncodedEvent {
    fn new(input: &EventInput) -> Result<Self> {
        Ok(Self {
            images: to_json(&input.images)?,
            details: to_json(&input.details)?,
            services: to_json(&input.services)?,
            testimonial: input.testimonial.as_ref().map(to_json).transpose()?,
            tags: to_json(&input.tags)?,
        })
    }
}

/// WHERE clause (without the keyword) plus its positional parameters.
/// Search terms are OR-ed, each matching title, description or tags.
fn filter_clause(filter: &EventFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["e.is_active = 1".to_string()];
    let mut params: Vec<Value> = Vec::new();

    if let Some(category) = filter.category {
        params.push(Value::Text(category.as_str().to_string()));
        clauses.push(format!("e.category = ?{}", params.len()));
    }

    if filter.featured_only {
        clauses.push("e.is_featured = 1".to_string());
    }

    if let Some(search) = filter.search.as_deref() {
        let mut any = Vec::new();
        for term in search.split_whitespace() {
            params.push(Value::Text(format!("%{}%", escape_like(&term.to_lowercase()))));
            let n = params.len();
            any.push(format!(
                "(lower(e.title) LIKE ?{n} ESCAPE '\\' OR lower(e.description) LIKE ?{n} ESCAPE '\\' OR lower(e.tags) LIKE ?{n} ESCAPE '\\')"
            ));
        }
        if !any.is_empty() {
            clauses.push(format!("({})", any.join(" OR ")));
        }
    }

    (clauses.join(" AND "), params)
}

fn query_event(conn: &Connection, id: Uuid, active_only: bool) -> Result<Option<PortfolioEvent>> {
    let sql = if active_only {
        format!("{EVENT_SELECT} WHERE e.id = ?1 AND e.is_active = 1")
    } else {
        format!("{EVENT_SELECT} WHERE e.id = ?1")
    };
    let event = conn.query_row(&sql, [id.to_string()], map_event).optional()?;
    Ok(event)
}

fn map_event(row: &Row<'_>) -> rusqlite::Result<PortfolioEvent> {
    Ok(PortfolioEvent {
        id: col(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: col(row, 3)?,
        images: json_col(row, 4)?,
        details: json_col(row, 5)?,
        services: json_col(row, 6)?,
        testimonial: opt_json_col(row, 7)?,
        tags: json_col(row, 8)?,
        is_active: row.get(9)?,
        is_featured: row.get(10)?,
        created_by: col(row, 11)?,
        created_by_name: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use fete_types::models::Role;

    fn seed_admin(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id,
            name: "Admin".into(),
            email: "admin@example.com".into(),
            password_hash: "x".into(),
            phone: None,
            role: Role::Admin,
        })
        .unwrap();
        id
    }

    fn input(title: &str, category: EventCategory, tags: &[&str], featured: bool) -> EventInput {
        EventInput {
            title: title.into(),
            description: format!("{title} description"),
            category,
            images: vec![],
            details: Default::default(),
            services: vec![],
            testimonial: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            is_featured: featured,
            is_active: true,
        }
    }

    #[test]
    fn deactivated_events_disappear_from_reads() {
        let db = Database::open_in_memory().unwrap();
        let admin = seed_admin(&db);
        let id = Uuid::new_v4();
        db.insert_event(id, admin, &input("Gala", EventCategory::Formal, &[], false)).unwrap();

        assert!(db.deactivate_event(id).unwrap());
        assert!(db.get_active_event(id).unwrap().is_none());
        let (events, total) = db.list_events(&EventFilter::default(), 0, 12).unwrap();
        assert!(events.is_empty());
        assert_eq!(total, 0);

        // Second delete finds nothing active
        assert!(!db.deactivate_event(id).unwrap());
    }

    #[test]
    fn filters_by_category_featured_and_search() {
        let db = Database::open_in_memory().unwrap();
        let admin = seed_admin(&db);
        db.insert_event(Uuid::new_v4(), admin, &input("Winter Gala", EventCategory::Formal, &["black-tie"], true)).unwrap();
        db.insert_event(Uuid::new_v4(), admin, &input("Backyard BBQ", EventCategory::Casual, &["summer"], false)).unwrap();
        db.insert_event(Uuid::new_v4(), admin, &input("Craft Wedding", EventCategory::Diy, &["rustic"], false)).unwrap();

        let formal = EventFilter { category: Some(EventCategory::Formal), ..Default::default() };
        assert_eq!(db.list_events(&formal, 0, 12).unwrap().1, 1);

        let featured = EventFilter { featured_only: true, ..Default::default() };
        let (events, _) = db.list_events(&featured, 0, 12).unwrap();
        assert_eq!(events[0].title, "Winter Gala");

        let search = EventFilter { search: Some("SUMMER rustic".into()), ..Default::default() };
        let (events, total) = db.list_events(&search, 0, 12).unwrap();
        assert_eq!(total, 2);
        assert!(events.iter().all(|e| e.title != "Winter Gala"));
    }

    #[test]
    fn featured_events_sort_first() {
        let db = Database::open_in_memory().unwrap();
        let admin = seed_admin(&db);
        db.insert_event(Uuid::new_v4(), admin, &input("Plain", EventCategory::Casual, &[], false)).unwrap();
        db.insert_event(Uuid::new_v4(), admin, &input("Star", EventCategory::Casual, &[], true)).unwrap();

        let (events, _) = db.list_events(&EventFilter::default(), 0, 12).unwrap();
        assert_eq!(events[0].title, "Star");
        assert_eq!(events[0].created_by_name.as_deref(), Some("Admin"));
    }

    #[test]
    fn stats_count_active_events_only() {
        let db = Database::open_in_memory().unwrap();
        let admin = seed_admin(&db);
        let gone = Uuid::new_v4();
        db.insert_event(gone, admin, &input("A", EventCategory::Formal, &[], false)).unwrap();
        db.insert_event(Uuid::new_v4(), admin, &input("B", EventCategory::Casual, &[], false)).unwrap();
        db.insert_event(Uuid::new_v4(), admin, &input("C", EventCategory::Casual, &[], false)).unwrap();
        db.deactivate_event(gone).unwrap();

        let stats = db.category_stats().unwrap();
        assert_eq!(stats, vec![(EventCategory::Casual, 2)]);
    }
}
