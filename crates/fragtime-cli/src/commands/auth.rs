use std::io::BufRead;

use clap::Subcommand;
use fragtime_core::{AdapterKind, AuthOutcome};
use serde::Serialize;

use crate::context::{print_json, AppContext, CliResult};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Sign in; guest records are migrated quietly when small enough
    Login {
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account; guest records are migrated once signed in
    Signup {
        email: String,
        #[arg(long)]
        password: Option<String>,
        /// Display name (defaults to the part of the email before '@')
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out (guests lose their local records)
    Logout,
    /// Enter guest mode, or leave it with --off
    Guest {
        #[arg(long)]
        off: bool,
    },
    /// Send a password reset email
    Reset { email: String },
    /// Show the current session
    Status,
}

#[derive(Serialize)]
struct StatusView {
    authenticated: bool,
    guest_mode: bool,
    user_id: Option<String>,
    display_name: Option<String>,
    storage: &'static str,
}

fn password_from(arg: Option<String>) -> CliResult<String> {
    if let Some(password) = arg {
        return Ok(password);
    }
    eprint!("password: ");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err("a password is required".into());
    }
    Ok(password)
}

fn report(outcome: &AuthOutcome) -> CliResult {
    if outcome.needs_verification {
        println!("check your inbox to confirm the account, then run `fragtime auth login`");
    }
    if let Some(migration) = &outcome.migration {
        print_json(migration)?;
    }
    Ok(())
}

pub async fn run(ctx: &AppContext, action: AuthAction) -> CliResult {
    match action {
        AuthAction::Login { email, password } => {
            let password = password_from(password)?;
            let outcome = ctx.auth.sign_in(&email, &password).await?;
            println!("signed in as {email}");
            report(&outcome)?;
        }
        AuthAction::Signup {
            email,
            password,
            name,
        } => {
            let password = password_from(password)?;
            let outcome = ctx.auth.sign_up(&email, &password, name.as_deref()).await?;
            if !outcome.needs_verification {
                println!("account created for {email}");
            }
            report(&outcome)?;
        }
        AuthAction::Logout => {
            ctx.auth.sign_out().await?;
            println!("signed out");
        }
        AuthAction::Guest { off } => {
            ctx.auth.set_guest_mode(!off);
            println!("guest mode {}", if off { "off" } else { "on" });
        }
        AuthAction::Reset { email } => {
            ctx.auth.reset_password(&email).await?;
            println!("password reset email sent to {email}");
        }
        AuthAction::Status => {
            let session = ctx.auth.session();
            print_json(&StatusView {
                authenticated: session.is_authenticated(),
                guest_mode: session.guest_mode,
                user_id: session.user_id().map(str::to_string),
                display_name: session.display_name(),
                storage: match AdapterKind::for_session(&session) {
                    AdapterKind::Local => "local",
                    AdapterKind::Remote => "remote",
                },
            })?;
        }
    }
    Ok(())
}
