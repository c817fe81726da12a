//! ClearLabel CLI client - admin console for governed catalog updates

mod client;
mod messages;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use client::ClearLabelClient;

#[derive(Parser)]
#[command(name = "clearlabel")]
#[command(about = "CLI client for the ClearLabel update governance server")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(
        short,
        long,
        default_value = "http://localhost:3000",
        env = "CLEARLABEL_SERVER"
    )]
    server: String,

    /// Admin id to act as
    #[arg(short, long, env = "CLEARLABEL_ADMIN_ID")]
    admin: Uuid,

    /// Display name attached to requests and votes
    #[arg(
        short = 'n',
        long,
        default_value = "CLI Admin",
        env = "CLEARLABEL_ADMIN_NAME"
    )]
    name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// File a catalog update request
    Request,

    /// Vote on a pending request
    Vote {
        /// Request id to vote on
        request: String,

        /// "approve" or "reject"
        vote: String,
    },

    /// List pending requests with their tallies
    Pending,

    /// Show how an admin voted on a request
    VoteStatus {
        /// Request id to inspect
        request: String,

        /// Admin to inspect (defaults to your own id)
        #[arg(long)]
        voter: Option<Uuid>,
    },

    /// Veto a pending request (owner only)
    Veto {
        /// Request id to veto
        request: String,
    },

    /// Approve a pending request directly (owner only)
    Approve {
        /// Request id to approve
        request: String,
    },

    /// Queue an update immediately, skipping the vote (owner only)
    ForceUpdate,

    /// Show rate-limit counters and the admin roster
    Stats,

    /// Show queue depth and contents
    Queue,

    /// Show processor history and daily-update state
    Processor,

    /// Nudge the processor to drain the queue now (owner only)
    ForceProcess,

    /// Drop all queued updates (owner only)
    ClearQueue,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clearlabel_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let client = ClearLabelClient::new(&cli.server, cli.admin, &cli.name);

    match cli.command {
        Commands::Request => run_request(&client).await,
        Commands::Vote { request, vote } => run_vote(&client, &request, &vote).await,
        Commands::Pending => run_pending(&client).await,
        Commands::VoteStatus { request, voter } => run_vote_status(&client, &request, voter).await,
        Commands::Veto { request } => run_veto(&client, &request).await,
        Commands::Approve { request } => run_approve(&client, &request).await,
        Commands::ForceUpdate => run_force_update(&client).await,
        Commands::Stats => run_stats(&client).await,
        Commands::Queue => run_queue(&client).await,
        Commands::Processor => run_processor(&client).await,
        Commands::ForceProcess => run_force_process(&client).await,
        Commands::ClearQueue => run_clear_queue(&client).await,
    }
}

async fn run_request(client: &ClearLabelClient) -> Result<()> {
    let response = client.request_update().await?;
    println!("{}", response.message);
    println!("  request id: {}", response.request.id);
    if response.auto_approved {
        println!(
            "  queued for execution: {}",
            if response.queued { "yes" } else { "no" }
        );
    } else {
        println!(
            "  expires at: {}",
            response.request.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("  waiting for votes");
    }
    Ok(())
}

async fn run_vote(client: &ClearLabelClient, request_id: &str, vote: &str) -> Result<()> {
    let response = client.cast_vote(request_id, vote).await?;
    println!("{}", response.message);
    print_tally(&response.tally);
    println!("  status: {}", response.status.as_str());
    if response.queued {
        println!("  update queued for execution");
    }
    Ok(())
}

async fn run_pending(client: &ClearLabelClient) -> Result<()> {
    let response = client.pending_requests().await?;

    if response.requests.is_empty() {
        println!("No pending requests.");
        return Ok(());
    }

    println!("Pending requests ({}):", response.count);
    println!("{:─<60}", "");
    for request in response.requests {
        println!("  {}", request.id);
        println!(
            "    by {} at {} (expires in {}s)",
            request.requester_name,
            request.created_at.format("%Y-%m-%d %H:%M"),
            request.expires_in_seconds
        );
        print_tally(&request.tally);
    }
    Ok(())
}

async fn run_vote_status(
    client: &ClearLabelClient,
    request_id: &str,
    voter: Option<Uuid>,
) -> Result<()> {
    let admin_id = voter.unwrap_or_else(|| client.admin_id());
    let status = client.vote_status(request_id, admin_id).await?;

    println!("Request {}", status.request_id);
    println!("  status: {}", status.status.as_str());
    println!(
        "  votes: {} approve / {} reject",
        status.approve_votes, status.reject_votes
    );
    match (status.vote, status.voted_at) {
        (Some(choice), Some(at)) => {
            let choice = match choice {
                messages::VoteChoice::Approve => "approve",
                messages::VoteChoice::Reject => "reject",
            };
            println!(
                "  {} voted {} at {}",
                admin_id,
                choice,
                at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        _ => println!("  {} has not voted", admin_id),
    }
    Ok(())
}

async fn run_veto(client: &ClearLabelClient, request_id: &str) -> Result<()> {
    let response = client.veto(request_id).await?;
    println!("{}", response.message);
    println!("  request id: {}", response.request.id);
    if let Some(reason) = response.request.rejection_reason {
        println!("  reason: {}", reason);
    }
    Ok(())
}

async fn run_approve(client: &ClearLabelClient, request_id: &str) -> Result<()> {
    let response = client.approve(request_id).await?;
    println!("{}", response.message);
    println!("  request id: {}", response.request.id);
    Ok(())
}

async fn run_force_update(client: &ClearLabelClient) -> Result<()> {
    let response = client.force_update().await?;
    println!("{}", response.message);
    println!("  queue item: {}", response.item.id);
    Ok(())
}

async fn run_stats(client: &ClearLabelClient) -> Result<()> {
    let stats = client.security_stats().await?;

    println!("Governance stats:");
    println!("{:─<60}", "");
    println!("  requests today:        {}", stats.total_requests_today);
    println!(
        "  democratic update used: {}",
        if stats.democratic_update_used_today {
            "yes"
        } else {
            "no"
        }
    );
    println!("  pending requests:      {}", stats.pending_requests);
    println!("  voting admins:         {}", stats.total_admins);

    if !stats.admin_roster.is_empty() {
        println!("Roster:");
        for profile in &stats.admin_roster {
            println!(
                "  {} - {} ({})",
                profile.user_id,
                profile.display_name,
                match profile.role {
                    messages::Role::Admin => "admin",
                    messages::Role::Owner => "owner",
                }
            );
        }
    }

    if !stats.request_stats.is_empty() {
        println!("Request counters:");
        for counter in &stats.request_stats {
            println!(
                "  {} - {} today{}",
                counter.admin_id,
                counter.requests_today,
                if counter.has_active_request {
                    " (active request)"
                } else {
                    ""
                }
            );
        }
    }
    Ok(())
}

async fn run_queue(client: &ClearLabelClient) -> Result<()> {
    let response = client.queue_status().await?;
    let stats = response.stats;

    println!(
        "Queue: {}/{} ({})",
        stats.depth,
        stats.capacity,
        if stats.is_healthy { "healthy" } else { "full" }
    );
    println!(
        "  enqueued {} / rejected {} / cleared {}",
        stats.total_enqueued, stats.total_rejected, stats.total_cleared
    );

    if !response.queue.is_empty() {
        println!("{:─<60}", "");
        for item in response.queue {
            println!(
                "  {} - {} by {} at {}",
                item.id,
                item.kind.as_str(),
                item.requester_name,
                item.enqueued_at.format("%H:%M:%S")
            );
        }
    }
    Ok(())
}

async fn run_processor(client: &ClearLabelClient) -> Result<()> {
    let response = client.processor_stats().await?;

    println!(
        "Processor: {} executed, {} failed",
        response.stats.total_executed, response.stats.total_failed
    );
    println!(
        "Daily update: {}",
        if response.update.is_updating {
            "running".to_string()
        } else {
            match response.update.last_update_time {
                Some(at) => format!("last ran {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => "never run".to_string(),
            }
        }
    );

    if !response.recent.is_empty() {
        println!("Recent executions:");
        println!("{:─<60}", "");
        for record in response.recent {
            println!(
                "  {} - {} ({})",
                record.finished_at.format("%H:%M:%S"),
                record.kind.as_str(),
                if record.success {
                    "ok".to_string()
                } else {
                    record.error.unwrap_or_else(|| "failed".to_string())
                }
            );
        }
    }
    Ok(())
}

async fn run_force_process(client: &ClearLabelClient) -> Result<()> {
    let response = client.force_queue_process().await?;
    println!("{}", response.message);
    Ok(())
}

async fn run_clear_queue(client: &ClearLabelClient) -> Result<()> {
    let response = client.clear_queue().await?;
    println!("{}", response.message);
    if let Some(cleared) = response.cleared {
        println!("  cleared {} item(s)", cleared);
    }
    Ok(())
}

fn print_tally(tally: &messages::VoteTally) {
    println!(
        "    votes: {} approve / {} reject (need {} approvals or {} rejections of {} admins)",
        tally.approve_votes,
        tally.reject_votes,
        tally.required_approve,
        tally.required_reject,
        tally.total_admins
    );
}
