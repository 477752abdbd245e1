use std::io::{self, Write};

use bcrypt::{hash, DEFAULT_COST};
use dotenvy::dotenv;
use faraja::db;
use faraja::models::auth::{NewUser, Role};
use faraja::store::{PgStore, StoreError, UserStore};

fn prompt(label: &str) -> io::Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Faraja - Create admin account");
    println!("=============================");

    dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL must be set (environment or .env file)")?;
    let pool = db::create_pool(&database_url, 1).await?;
    let store = PgStore::new(pool.clone());

    let name = prompt("Name")?;
    if name.is_empty() {
        eprintln!("Name cannot be empty");
        return Ok(());
    }

    let email = prompt("Email address")?.to_lowercase();
    if email.is_empty() || !email.contains('@') {
        eprintln!("Invalid email address");
        return Ok(());
    }

    print!("Password: ");
    io::stdout().flush()?;
    let password = rpassword::read_password()?;
    if password.len() < 6 {
        eprintln!("Password must be at least 6 characters long");
        return Ok(());
    }

    print!("Password (again): ");
    io::stdout().flush()?;
    if rpassword::read_password()? != password {
        eprintln!("Passwords don't match");
        return Ok(());
    }

    let result = store
        .create_user(NewUser {
            name,
            email,
            password_hash: hash(&password, DEFAULT_COST)?,
            role: Role::Admin,
        })
        .await;

    match result {
        Ok(user) => {
            println!();
            println!("Admin account created");
            println!("   ID: {}", user.id);
            println!("   Name: {}", user.name);
            println!("   Email: {}", user.email);
            println!("Sign in through POST /api/admin/login");
        }
        Err(StoreError::Duplicate(_)) => eprintln!("A user with this email already exists"),
        Err(e) => eprintln!("Failed to create admin account: {}", e),
    }

    pool.close().await;
    Ok(())
}
