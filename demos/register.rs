//! Registering jobs against a Redis-backed queue manager.
//!
//! This example demonstrates:
//! - Building the process-wide manager from the environment
//! - Registering a cron job and a plain job in one call
//! - Enqueueing a delayed job and letting a scheduler promote it
//! - Completed/failed logging attached by the registrar
//!
//! Prerequisites:
//! - Redis server running on localhost:6379 (or `QM_REDIS_HOST`/`QM_REDIS_PORT`)
//!
//! Run with: `cargo run --example register`

use qm::{
    handler, register_jobs, Job, JobDefinition, JobError, JobResult, JobsOptions, ManagerConfig,
    QueueManager, RepeatOptions,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Email job payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmailJob {
    to: String,
    subject: String,
}

async fn send_email(job: Job) -> JobResult {
    let email: EmailJob = serde_json::from_value(job.data)?;
    println!("[email] to={} subject={}", email.to, email.subject);

    tokio::time::sleep(Duration::from_millis(200)).await;

    if email.to.is_empty() {
        return Err(JobError::new("missing recipient"));
    }
    Ok(())
}

async fn cleanup(job: Job) -> JobResult {
    println!("[cleanup] run {}", job.id);
    Ok(())
}

#[tokio::main]
async fn main() -> qm::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ManagerConfig::from_env();
    println!("Using {:?}\n", config.connection());

    let manager = QueueManager::get_instance(Some(config))?;

    let definitions = vec![
        JobDefinition::cron(
            "maintenance",
            "cleanup",
            JobsOptions::repeat(RepeatOptions::cron("*/1 * * * *")),
            handler(cleanup),
        ),
        JobDefinition::new("emails", "send", handler(send_email)),
    ];

    if let Err(e) = register_jobs(definitions, &manager).await {
        eprintln!("Registration failed: {}", e);
        eprintln!("Make sure Redis is running: docker run -d -p 6379:6379 redis");
        return Err(e);
    }

    let emails = manager.get_queue("emails", None)?;
    manager.get_scheduler("emails", None)?;

    let welcome = EmailJob {
        to: "user@example.com".to_string(),
        subject: "Welcome".to_string(),
    };
    let job = emails.add("send", serde_json::to_value(&welcome)?, JobsOptions::default()).await?;
    println!("enqueued: {}", job.id);

    let broken = EmailJob {
        to: String::new(),
        subject: "Nobody".to_string(),
    };
    let job = emails
        .add("send", serde_json::to_value(&broken)?, JobsOptions::default().delay(2_000))
        .await?;
    println!("scheduled: {} (2s delay, will fail)\n", job.id);

    println!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    manager.close().await?;
    println!("Shutdown complete");
    Ok(())
}
