use crate::domain::models::{Employee, EmployeeRole};
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

struct SeedEmployee<'a> {
    code: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    role: EmployeeRole,
    hired: (i32, u32, u32),
}

const DEMO_EMPLOYEES: &[SeedEmployee<'static>] = &[
    SeedEmployee {
        code: "0000",
        first_name: "Alex",
        last_name: "Morgan",
        email: "alex.morgan@example.com",
        role: EmployeeRole::Admin,
        hired: (2019, 3, 4),
    },
    SeedEmployee {
        code: "7139",
        first_name: "Jordan",
        last_name: "Reyes",
        email: "jordan.reyes@example.com",
        role: EmployeeRole::Manager,
        hired: (2020, 6, 15),
    },
    SeedEmployee {
        code: "4582",
        first_name: "Sam",
        last_name: "Okafor",
        email: "sam.okafor@example.com",
        role: EmployeeRole::Employee,
        hired: (2021, 1, 11),
    },
    SeedEmployee {
        code: "9267",
        first_name: "Riley",
        last_name: "Novak",
        email: "riley.novak@example.com",
        role: EmployeeRole::Employee,
        hired: (2022, 9, 1),
    },
    SeedEmployee {
        code: "3814",
        first_name: "Casey",
        last_name: "Lindqvist",
        email: "casey.lindqvist@example.com",
        role: EmployeeRole::Employee,
        hired: (2023, 2, 20),
    },
];

fn hire_date(seed: &SeedEmployee<'_>) -> Result<NaiveDate> {
    let (y, m, d) = seed.hired;
    NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| anyhow::anyhow!("invalid hire date for {}", seed.email))
}

fn hash_code(argon: &Argon2<'_>, code: &str) -> Result<String> {
    let salt = SaltString::generate(rand_core::OsRng);
    Ok(argon
        .hash_password(code.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash credential: {}", e))?
        .to_string())
}

/// Demo employees for the in-memory backend, with fresh ids.
pub fn demo_employees() -> Result<Vec<Employee>> {
    let now = Utc::now();
    DEMO_EMPLOYEES
        .iter()
        .map(|seed| {
            Ok(Employee {
                id: Uuid::new_v4(),
                first_name: seed.first_name.to_string(),
                last_name: seed.last_name.to_string(),
                email: seed.email.to_string(),
                role: seed.role,
                active: true,
                hire_date: hire_date(seed)?,
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}

/// Inserts the demo employees; rows whose email already exists are left alone.
pub async fn seed_employees(pool: &PgPool) -> Result<()> {
    let argon = Argon2::default();
    let mut inserted = 0u64;
    for seed in DEMO_EMPLOYEES {
        let hash = hash_code(&argon, seed.code)?;
        let result = sqlx::query(
            r#"
            INSERT INTO employees (id, first_name, last_name, email, credential_hash, role, active, hire_date)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(seed.first_name)
        .bind(seed.last_name)
        .bind(seed.email)
        .bind(hash)
        .bind(seed.role)
        .bind(hire_date(seed)?)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }
    tracing::info!("Seeded {} demo employees", inserted);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_employees_are_distinct_and_active() {
        let employees = demo_employees().unwrap();
        assert_eq!(employees.len(), DEMO_EMPLOYEES.len());
        let emails: std::collections::HashSet<_> = employees.iter().map(|e| &e.email).collect();
        assert_eq!(emails.len(), employees.len());
        assert!(employees.iter().all(|e| e.active));
    }

    #[test]
    fn credential_hash_is_phc_string() {
        let hash = hash_code(&Argon2::default(), "4582").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains("4582"));
    }
}
