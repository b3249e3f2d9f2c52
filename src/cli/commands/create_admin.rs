use anyhow::{Context, Result};
use rand::Rng;

use crate::api::validation::validate_email;
use crate::config::Config;
use crate::db::{NewUser, Store};
use crate::domain::Actor;
use crate::services::notifier::{Notifier, credentials_message};

const GENERATED_PASSWORD_LENGTH: usize = 10;

/// Create a superuser wired to the SUPERADMIN designation. Prints the
/// generated password when none was supplied; optionally mails the
/// credentials instead.
pub async fn execute(
    config: &Config,
    notifier: &dyn Notifier,
    user_id: &str,
    username: &str,
    email: &str,
    password: Option<String>,
    notify: bool,
) -> Result<()> {
    let email = validate_email(email)?;

    let store = Store::new(&config.general.database_path).await?;

    let designation = store
        .designations()
        .ensure_superadmin(&Actor::System)
        .await?;

    let generated = password.is_none();
    let password = password.unwrap_or_else(generate_password);

    let user = store
        .users(&config.security)
        .create(
            NewUser {
                user_id: user_id.to_string(),
                username: username.to_string(),
                email: email.to_string(),
                password: password.clone(),
                first_name: String::new(),
                last_name: String::new(),
                designation_id: Some(designation.id),
                phone_number: None,
                is_staff: true,
                is_superuser: true,
            },
            &Actor::System,
        )
        .await
        .context("Failed to create admin user")?;

    println!("Created superuser {} ({})", user.user_id, user.username);

    if notify {
        let (subject, body) = credentials_message(
            &user.user_id,
            &user.username,
            &password,
            &config.email.frontend_url,
        );
        notifier
            .send(&user.email, &subject, &body)
            .await
            .context("Failed to send credentials email")?;
        println!("Credentials sent to {}", user.email);
    } else if generated {
        println!("Generated password: {password}");
        println!("Change it after the first login.");
    }

    Ok(())
}

/// Random password with at least one character from each class.
fn generate_password() -> String {
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const DIGITS: &[u8] = b"0123456789";
    const SPECIAL: &[u8] = b"!@#$%^&*";

    fn pick(rng: &mut impl Rng, set: &[u8]) -> u8 {
        set[rng.random_range(0..set.len())]
    }

    let mut rng = rand::rng();
    let all: Vec<u8> = [LOWER, UPPER, DIGITS, SPECIAL].concat();

    let mut password = vec![
        pick(&mut rng, LOWER),
        pick(&mut rng, UPPER),
        pick(&mut rng, DIGITS),
        pick(&mut rng, SPECIAL),
    ];
    while password.len() < GENERATED_PASSWORD_LENGTH {
        password.push(pick(&mut rng, &all));
    }

    // Shuffle so the class-guaranteed characters are not positional.
    for i in (1..password.len()).rev() {
        let j = rng.random_range(0..=i);
        password.swap(i, j);
    }

    password.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_cover_all_classes() {
        for _ in 0..16 {
            let password = generate_password();
            assert_eq!(password.len(), GENERATED_PASSWORD_LENGTH);
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
            assert!(password.chars().any(|c| "!@#$%^&*".contains(c)));
        }
    }
}
