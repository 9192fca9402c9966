use std::sync::Arc;

use mailsift::config::Settings;
use mailsift::mail::{ImapConfig, ImapTransport};
use mailsift::run::Orchestrator;
use mailsift::table::WriteOutcome;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.json".to_string());
    let settings = Settings::load(std::path::Path::new(&settings_path))?;

    // The password is never persisted alongside the other settings.
    let password = std::env::var("MAILSIFT_IMAP_PASSWORD").unwrap_or_else(|_| {
        eprintln!("Error: MAILSIFT_IMAP_PASSWORD not set");
        eprintln!("  export MAILSIFT_IMAP_PASSWORD=...");
        std::process::exit(1);
    });

    eprintln!("mailsift v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Server:  {}:{}", settings.imap_host, settings.imap_port);
    eprintln!("   User:    {}", settings.email_user);
    eprintln!("   Subject: {}", settings.search_subject);
    eprintln!("   Fields:  {}", settings.fields.len());
    if let Some(join) = &settings.join {
        eprintln!(
            "   Join:    {} on {}",
            join.reference_path.display(),
            join.key_field
        );
    }

    let transport = ImapTransport::new(ImapConfig::new(
        settings.imap_host.clone(),
        settings.imap_port,
        settings.email_user.clone(),
        secrecy::SecretString::from(password),
    ));

    let orchestrator = Orchestrator::new(settings, Arc::new(transport));
    let report = orchestrator.run().await?;

    eprintln!(
        "\nDone: {} attempted, {} accumulated",
        report.attempted, report.accumulated
    );
    match report.write {
        WriteOutcome::NothingToWrite => eprintln!("Nothing to write."),
        WriteOutcome::Written {
            path,
            rows_appended,
            total_rows,
        } => eprintln!(
            "Wrote {} row(s) to {} ({} total)",
            rows_appended,
            path.display(),
            total_rows
        ),
    }

    Ok(())
}
