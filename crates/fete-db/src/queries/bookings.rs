use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use fete_types::models::{Booking, BookingNotes, BookingStatus, FollowUp, Payment, PaymentStatus, UserRef};

use super::{col, json_col, opt_col, timestamp, to_json};
use crate::Database;
use crate::models::{BookingChanges, BookingScope, NewBooking, PaidTransition};

const BOOKING_SELECT: &str = "SELECT b.id, c.id, c.name, c.email, c.phone,
        b.service_type, b.event_category, b.event_details, b.consultation_date, b.duration,
        b.status, b.amount, b.currency, b.payment_intent_id, b.payment_status, b.paid_at,
        p.id, p.name, p.email, p.phone,
        b.note_client, b.note_planner, b.note_admin, b.follow_up, b.created_at, b.updated_at
 FROM bookings b
 JOIN users c ON c.id = b.client_id
 LEFT JOIN users p ON p.id = b.assigned_planner";

impl Database {
    pub fn insert_booking(&self, new: &NewBooking) -> Result<Booking> {
        let now = Utc::now();
        let details = to_json(&new.event_details)?;
        let follow_up = to_json(&FollowUp::default())?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bookings (id, client_id, service_type, event_category, event_details,
                                       consultation_date, duration, status, amount, currency,
                                       payment_status, note_client, follow_up, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, 'pending', ?10, ?11, ?12, ?12)",
                rusqlite::params![
                    new.id.to_string(),
                    new.client_id.to_string(),
                    new.service_type.as_str(),
                    new.event_category.as_str(),
                    details,
                    new.consultation_date,
                    new.duration,
                    new.amount,
                    new.currency,
                    new.client_note,
                    follow_up,
                    now,
                ],
            )?;
            query_booking(conn, new.id)?
                .ok_or_else(|| anyhow::anyhow!("booking {} vanished after insert", new.id))
        })
    }

    pub fn get_booking(&self, id: Uuid) -> Result<Option<Booking>> {
        self.with_conn(|conn| query_booking(conn, id))
    }

    /// Bookings visible under `scope`, newest first.
    pub fn list_bookings(
        &self,
        scope: BookingScope,
        status: Option<BookingStatus>,
        offset: u32,
        limit: u32,
    ) -> Result<(Vec<Booking>, u64)> {
        let mut clauses = vec!["1 = 1".to_string()];
        let mut params: Vec<Value> = Vec::new();

        match scope {
            BookingScope::All => {}
            BookingScope::Client(id) => {
                params.push(Value::Text(id.to_string()));
                clauses.push(format!("b.client_id = ?{}", params.len()));
            }
            BookingScope::Planner(id) => {
                params.push(Value::Text(id.to_string()));
                clauses.push(format!("b.assigned_planner = ?{}", params.len()));
            }
        }
        if let Some(status) = status {
            params.push(Value::Text(status.as_str().to_string()));
            clauses.push(format!("b.status = ?{}", params.len()));
        }
        let clause = clauses.join(" AND ");

        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM bookings b WHERE {clause}"),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            let n = params.len();
            params.push(Value::Integer(i64::from(limit)));
            params.push(Value::Integer(i64::from(offset)));
            let sql = format!(
                "{BOOKING_SELECT} WHERE {clause} ORDER BY b.created_at DESC LIMIT ?{} OFFSET ?{}",
                n + 1,
                n + 2
            );
            let mut stmt = conn.prepare(&sql)?;
            let bookings = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), map_booking)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((bookings, total as u64))
        })
    }

    /// Apply column-level changes. Returns `None` when the booking is missing.
    pub fn update_booking(&self, id: Uuid, changes: &BookingChanges) -> Result<Option<Booking>> {
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<Value> = vec![Value::Text(id.to_string())];
        let mut set = |column: &str, value: Value| {
            params.push(value);
            sets.push(format!("{column} = ?{}", params.len()));
        };

        if let Some(status) = changes.status {
            set("status", Value::Text(status.as_str().to_string()));
        }
        if let Some(planner) = changes.assigned_planner {
            set("assigned_planner", Value::Text(planner.to_string()));
        }
        if let Some(details) = &changes.event_details {
            set("event_details", Value::Text(to_json(details)?));
        }
        if let Some(date) = changes.consultation_date {
            set("consultation_date", timestamp(date));
        }
        if let Some(duration) = changes.duration {
            set("duration", Value::Integer(i64::from(duration)));
        }
        if let Some(follow_up) = &changes.follow_up {
            set("follow_up", Value::Text(to_json(follow_up)?));
        }
        if let Some(note) = &changes.note_client {
            set("note_client", Value::Text(note.clone()));
        }
        if let Some(note) = &changes.note_planner {
            set("note_planner", Value::Text(note.clone()));
        }
        if let Some(note) = &changes.note_admin {
            set("note_admin", Value::Text(note.clone()));
        }
        set("updated_at", timestamp(Utc::now()));

        let sql = format!("UPDATE bookings SET {} WHERE id = ?1", sets.join(", "));
        self.with_conn(|conn| {
            let changed = conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
            if changed == 0 {
                return Ok(None);
            }
            query_booking(conn, id)
        })
    }

    /// Remember the processor's intent id for a booking. A newer intent
    /// replaces an older one; a paid booking keeps the intent that paid it.
    /// Returns false when the booking is missing or already paid.
    pub fn set_payment_intent(&self, id: Uuid, intent_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE bookings SET payment_intent_id = ?2, updated_at = ?3
                 WHERE id = ?1 AND payment_status != 'paid'",
                rusqlite::params![id.to_string(), intent_id, Utc::now()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Conditional paid transition keyed on the stored intent id. When
    /// `client` is set only that client's booking is considered.
    pub fn mark_paid(&self, intent_id: &str, client: Option<Uuid>) -> Result<PaidTransition> {
        let client = client.map(|c| c.to_string());
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE bookings
                 SET payment_status = 'paid', paid_at = ?3, status = 'confirmed', updated_at = ?3
                 WHERE payment_intent_id = ?1
                   AND payment_status != 'paid'
                   AND (?2 IS NULL OR client_id = ?2)",
                rusqlite::params![intent_id, client, Utc::now()],
            )?;
            let id: Option<String> = tx
                .query_row(
                    "SELECT id FROM bookings
                     WHERE payment_intent_id = ?1 AND (?2 IS NULL OR client_id = ?2)",
                    rusqlite::params![intent_id, client],
                    |row| row.get(0),
                )
                .optional()?;
            tx.commit()?;

            let Some(id) = id else {
                return Ok(PaidTransition::NotFound);
            };
            let id: Uuid = id.parse()?;
            Ok(if changed > 0 {
                PaidTransition::Applied(id)
            } else {
                PaidTransition::AlreadyPaid(id)
            })
        })
    }

    /// Record a failed charge. Paid or refunded bookings are left alone.
    pub fn mark_failed(&self, intent_id: &str) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "UPDATE bookings SET payment_status = 'failed', updated_at = ?2
                     WHERE payment_intent_id = ?1 AND payment_status NOT IN ('paid', 'refunded')
                     RETURNING id",
                    rusqlite::params![intent_id, Utc::now()],
                    |row| row.get(0),
                )
                .optional()?;
            id.map(|id| id.parse().map_err(anyhow::Error::from)).transpose()
        })
    }
}

fn query_booking(conn: &Connection, id: Uuid) -> Result<Option<Booking>> {
    let booking = conn
        .query_row(&format!("{BOOKING_SELECT} WHERE b.id = ?1"), [id.to_string()], map_booking)
        .optional()?;
    Ok(booking)
}

fn map_booking(row: &Row<'_>) -> rusqlite::Result<Booking> {
    let planner_id: Option<Uuid> = opt_col(row, 16)?;
    let assigned_planner = match planner_id {
        Some(id) => Some(UserRef {
            id,
            name: row.get(17)?,
            email: row.get(18)?,
            phone: row.get(19)?,
        }),
        None => None,
    };

    Ok(Booking {
        id: col(row, 0)?,
        client: UserRef {
            id: col(row, 1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
        },
        service_type: col(row, 5)?,
        event_category: col(row, 6)?,
        event_details: json_col(row, 7)?,
        consultation_date: row.get(8)?,
        duration: row.get(9)?,
        status: col(row, 10)?,
        payment: Payment {
            amount: row.get(11)?,
            currency: row.get(12)?,
            payment_intent_id: row.get(13)?,
            status: col::<PaymentStatus>(row, 14)?,
            paid_at: row.get(15)?,
        },
        assigned_planner,
        notes: BookingNotes {
            client: row.get(20)?,
            planner: row.get(21)?,
            admin: row.get(22)?,
        },
        follow_up: json_col(row, 23)?,
        created_at: row.get(24)?,
        updated_at: row.get(25)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use chrono::Duration;
    use fete_types::models::{EventCategory, EventDetails, Role, ServiceType, DEFAULT_CURRENCY};

    fn seed_user(db: &Database, email: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id,
            name: email.split('@').next().unwrap_or_default().into(),
            email: email.into(),
            password_hash: "x".into(),
            phone: None,
            role,
        })
        .unwrap();
        id
    }

    fn book(db: &Database, client: Uuid) -> Booking {
        db.insert_booking(&NewBooking {
            id: Uuid::new_v4(),
            client_id: client,
            service_type: ServiceType::Consultation,
            event_category: EventCategory::Formal,
            event_details: EventDetails { title: Some("Gala".into()), ..Default::default() },
            consultation_date: Utc::now() + Duration::days(7),
            duration: 60,
            amount: ServiceType::Consultation.price(),
            currency: DEFAULT_CURRENCY.into(),
            client_note: Some("vegan menu".into()),
        })
        .unwrap()
    }

    #[test]
    fn new_booking_starts_pending() {
        let db = Database::open_in_memory().unwrap();
        let client = seed_user(&db, "ana@example.com", Role::Client);
        let booking = book(&db, client);

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment.status, PaymentStatus::Pending);
        assert_eq!(booking.payment.amount, 150);
        assert_eq!(booking.client.email, "ana@example.com");
        assert_eq!(booking.notes.client.as_deref(), Some("vegan menu"));
        assert!(booking.follow_up.required);
        assert!(booking.assigned_planner.is_none());
    }

    #[test]
    fn mark_paid_applies_once() {
        let db = Database::open_in_memory().unwrap();
        let client = seed_user(&db, "ana@example.com", Role::Client);
        let booking = book(&db, client);
        db.set_payment_intent(booking.id, "pi_123").unwrap();

        assert_eq!(db.mark_paid("pi_123", Some(client)).unwrap(), PaidTransition::Applied(booking.id));
        let first = db.get_booking(booking.id).unwrap().unwrap();
        assert_eq!(first.status, BookingStatus::Confirmed);
        assert_eq!(first.payment.status, PaymentStatus::Paid);

        assert_eq!(db.mark_paid("pi_123", None).unwrap(), PaidTransition::AlreadyPaid(booking.id));
        let second = db.get_booking(booking.id).unwrap().unwrap();
        assert_eq!(second.payment.paid_at, first.payment.paid_at);
    }

    #[test]
    fn mark_paid_is_scoped_to_the_client() {
        let db = Database::open_in_memory().unwrap();
        let owner = seed_user(&db, "ana@example.com", Role::Client);
        let other = seed_user(&db, "bo@example.com", Role::Client);
        let booking = book(&db, owner);
        db.set_payment_intent(booking.id, "pi_abc").unwrap();

        assert_eq!(db.mark_paid("pi_abc", Some(other)).unwrap(), PaidTransition::NotFound);
        let unchanged = db.get_booking(booking.id).unwrap().unwrap();
        assert_eq!(unchanged.payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn paid_booking_keeps_its_intent() {
        let db = Database::open_in_memory().unwrap();
        let client = seed_user(&db, "ana@example.com", Role::Client);
        let booking = book(&db, client);

        assert!(db.set_payment_intent(booking.id, "pi_first").unwrap());
        assert!(db.set_payment_intent(booking.id, "pi_second").unwrap());
        db.mark_paid("pi_second", None).unwrap();

        assert!(!db.set_payment_intent(booking.id, "pi_third").unwrap());
        let paid = db.get_booking(booking.id).unwrap().unwrap();
        assert_eq!(paid.payment.payment_intent_id.as_deref(), Some("pi_second"));
        assert_eq!(db.mark_paid("pi_third", None).unwrap(), PaidTransition::NotFound);
    }

    #[test]
    fn failure_never_downgrades_a_paid_booking() {
        let db = Database::open_in_memory().unwrap();
        let client = seed_user(&db, "ana@example.com", Role::Client);
        let booking = book(&db, client);
        db.set_payment_intent(booking.id, "pi_9").unwrap();
        db.mark_paid("pi_9", None).unwrap();

        assert_eq!(db.mark_failed("pi_9").unwrap(), None);
        let paid = db.get_booking(booking.id).unwrap().unwrap();
        assert_eq!(paid.payment.status, PaymentStatus::Paid);
    }

    #[test]
    fn failure_leaves_booking_status_alone() {
        let db = Database::open_in_memory().unwrap();
        let client = seed_user(&db, "ana@example.com", Role::Client);
        let booking = book(&db, client);
        db.set_payment_intent(booking.id, "pi_f").unwrap();

        assert_eq!(db.mark_failed("pi_f").unwrap(), Some(booking.id));
        let failed = db.get_booking(booking.id).unwrap().unwrap();
        assert_eq!(failed.payment.status, PaymentStatus::Failed);
        assert_eq!(failed.status, BookingStatus::Pending);
    }

    #[test]
    fn listing_respects_scope() {
        let db = Database::open_in_memory().unwrap();
        let ana = seed_user(&db, "ana@example.com", Role::Client);
        let bo = seed_user(&db, "bo@example.com", Role::Client);
        let planner = seed_user(&db, "pat@example.com", Role::Planner);
        let mine = book(&db, ana);
        book(&db, bo);

        let changes = BookingChanges { assigned_planner: Some(planner), ..Default::default() };
        let assigned = db.update_booking(mine.id, &changes).unwrap().unwrap();
        assert_eq!(assigned.assigned_planner.map(|p| p.id), Some(planner));

        assert_eq!(db.list_bookings(BookingScope::All, None, 0, 10).unwrap().1, 2);
        let (own, total) = db.list_bookings(BookingScope::Client(ana), None, 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(own[0].id, mine.id);
        assert_eq!(db.list_bookings(BookingScope::Planner(planner), None, 0, 10).unwrap().1, 1);
        assert_eq!(
            db.list_bookings(BookingScope::All, Some(BookingStatus::Confirmed), 0, 10).unwrap().1,
            0
        );
    }

    #[test]
    fn update_touches_only_given_columns() {
        let db = Database::open_in_memory().unwrap();
        let client = seed_user(&db, "ana@example.com", Role::Client);
        let booking = book(&db, client);

        let changes = BookingChanges {
            note_planner: Some("call back friday".into()),
            status: Some(BookingStatus::Cancelled),
            ..Default::default()
        };
        let updated = db.update_booking(booking.id, &changes).unwrap().unwrap();
        assert_eq!(updated.status, BookingStatus::Cancelled);
        assert_eq!(updated.notes.planner.as_deref(), Some("call back friday"));
        assert_eq!(updated.notes.client.as_deref(), Some("vegan menu"));
        assert_eq!(updated.event_details.title.as_deref(), Some("Gala"));

        assert!(db.update_booking(Uuid::new_v4(), &changes).unwrap().is_none());
    }
}
