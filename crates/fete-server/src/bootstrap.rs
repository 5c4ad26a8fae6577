use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use fete_api::auth::{hash_password, normalize_email};
use fete_db::{Database, NewUser};
use fete_types::models::Role;

use crate::config::AdminSeed;

/// Make sure the seeded account exists with the admin role. Registration only
/// ever creates clients, so this is how the first admin appears.
pub fn ensure_admin(db: &Database, seed: &AdminSeed) -> anyhow::Result<()> {
    let email = normalize_email(&seed.email);

    match db.get_user_by_email(&email)? {
        Some(row) if row.user.role == Role::Admin => {}
        Some(row) => {
            db.set_user_role(row.user.id, Role::Admin)?;
            info!("Promoted {} to admin", email);
        }
        None => {
            let password_hash = hash_password(&seed.password).map_err(|e| anyhow::anyhow!("{e}"))?;
            db.create_user(&NewUser {
                id: Uuid::new_v4(),
                name: "Administrator".into(),
                email: email.clone(),
                password_hash,
                phone: None,
                role: Role::Admin,
            })
            .context("creating bootstrap admin")?;
            info!("Created bootstrap admin {}", email);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> AdminSeed {
        AdminSeed { email: " Ops@Fete.test".into(), password: "hunter22".into() }
    }

    #[test]
    fn creates_admin_once() {
        let db = Database::open_in_memory().unwrap();
        ensure_admin(&db, &seed()).unwrap();
        ensure_admin(&db, &seed()).unwrap();

        let row = db.get_user_by_email("ops@fete.test").unwrap().unwrap();
        assert_eq!(row.user.role, Role::Admin);
    }

    #[test]
    fn promotes_existing_client() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&NewUser {
            id: Uuid::new_v4(),
            name: "Ops".into(),
            email: "ops@fete.test".into(),
            password_hash: "x".into(),
            phone: None,
            role: Role::Client,
        })
        .unwrap();

        ensure_admin(&db, &seed()).unwrap();
        let row = db.get_user_by_email("ops@fete.test").unwrap().unwrap();
        assert_eq!(row.user.role, Role::Admin);
        assert_eq!(row.user.name, "Ops");
    }
}
