use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, normalize_database_url, Settings},
    BatchOutcome, CreationOutcome, SqliteRecordService, SubmitOutcome,
    TracingNotifier, WorkflowCoordinator, WorkflowServices,
};
use shared::domain::{fields, CaseId, FieldSet, ItemId, QuantityEdit};
use storage::Storage;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides the configured database URL.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a case with two sample items.
    Seed {
        #[arg(long, default_value = "Replacement parts")]
        subject: String,
    },
    /// Lists every case with its status.
    List,
    Show {
        case_id: String,
    },
    Add {
        case_id: String,
        #[arg(long)]
        quantity: i64,
        #[arg(long)]
        product: Option<String>,
    },
    Edit {
        case_id: String,
        item_id: String,
        quantity: u32,
    },
    Delete {
        case_id: String,
        #[arg(required = true)]
        item_ids: Vec<String>,
    },
    Submit {
        case_id: String,
    },
    /// Records the vendor order for a submitted case.
    MarkOrdered {
        case_id: String,
    },
}

struct Session {
    coordinator: Arc<WorkflowCoordinator>,
}

impl Session {
    async fn open(backend: &Arc<SqliteRecordService>, settings: &Settings, case_id: &str) -> Self {
        let services = WorkflowServices::new(
            backend.clone(),
            backend.clone(),
            Arc::new(TracingNotifier),
        );
        let coordinator = WorkflowCoordinator::new(
            services,
            Some(CaseId::new(case_id)),
            settings,
        );
        coordinator.start().await;
        Self { coordinator }
    }

    fn print(&self) {
        let view = self.coordinator.view();
        let status = view
            .case_status
            .map(|status| status.to_string())
            .unwrap_or_else(|| "unknown".into());
        println!(
            "case {}  status={status}  {}",
            view.record_id
                .as_ref()
                .map(CaseId::as_str)
                .unwrap_or("-"),
            view.items_badge()
        );
        if let Some(number) = &view.order_number {
            println!("order {number}");
        }
        println!(
            "locked={}  submit_enabled={}",
            view.is_locked(),
            !view.disable_submit()
        );
        for row in self.coordinator.items().rows() {
            println!(
                "  {}  {:<10} {:<24} x{}",
                row.id, row.product_code, row.product_name, row.quantity
            );
        }
    }
}

fn report_batch(outcome: BatchOutcome) -> Result<()> {
    match outcome {
        BatchOutcome::Applied { count } => {
            println!("applied {count} change(s)");
            Ok(())
        }
        BatchOutcome::Skipped(reason) => bail!("nothing done: {reason:?}"),
        BatchOutcome::Failed {
            attempted,
            failed,
            message,
        } => bail!("{failed} of {attempted} request(s) failed: {message}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(url) = cli.database_url {
        settings.database_url = normalize_database_url(&url);
    }
    let database_url = settings.database_url.clone();
    let store = Storage::new(&database_url).await.map_err(|err| {
        error!(%database_url, error = %err, "failed to open case database");
        err
    })?;
    let backend = SqliteRecordService::new(store.clone());

    match cli.command {
        Command::Seed { subject } => {
            store.upsert_product("P-100", "Impeller").await?;
            store.upsert_product("P-200", "Gasket set").await?;
            let case_id = store.create_case(&subject).await?;
            store.create_item(&case_id, Some("P-100"), 1).await?;
            store.create_item(&case_id, Some("P-200"), 4).await?;
            println!("created case {case_id}");
            Session::open(&backend, &settings, case_id.as_str()).await.print();
        }
        Command::List => {
            for case in store.list_cases().await? {
                println!(
                    "{}  {:<18} {}  (updated {})",
                    case.id,
                    case.status,
                    case.subject,
                    case.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Show { case_id } => {
            Session::open(&backend, &settings, &case_id).await.print();
        }
        Command::Add {
            case_id,
            quantity,
            product,
        } => {
            let session = Session::open(&backend, &settings, &case_id).await;
            session.coordinator.open_add_modal();
            let flow = session
                .coordinator
                .add_item_flow()
                .context("case is locked; items can no longer be added")?;
            let mut values = FieldSet::new();
            values.insert(fields::QUANTITY.into(), quantity.into());
            if let Some(code) = product {
                values.insert(fields::PRODUCT_CODE.into(), code.into());
            }
            let outcome = flow.submit(values).await;
            match outcome {
                CreationOutcome::Created(id) => println!("added item {id}"),
                CreationOutcome::Failed(message) => bail!("add failed: {message}"),
                CreationOutcome::Locked => bail!("case is locked"),
            }
            session.print();
        }
        Command::Edit {
            case_id,
            item_id,
            quantity,
        } => {
            let session = Session::open(&backend, &settings, &case_id).await;
            let outcome = session
                .coordinator
                .items()
                .save_edits(Some(vec![QuantityEdit::new(item_id, quantity)]))
                .await;
            report_batch(outcome)?;
            session.print();
        }
        Command::Delete { case_id, item_ids } => {
            let session = Session::open(&backend, &settings, &case_id).await;
            let items = session.coordinator.items();
            items.set_selection(item_ids.into_iter().map(ItemId::new));
            let outcome = items.delete_selected().await;
            report_batch(outcome)?;
            session.print();
        }
        Command::Submit { case_id } => {
            let session = Session::open(&backend, &settings, &case_id).await;
            match session.coordinator.submit_case().await {
                SubmitOutcome::Submitted => println!("submitted to vendor"),
                SubmitOutcome::Ignored => bail!("submit is not available for this case"),
                SubmitOutcome::Failed(message) => bail!("submit failed: {message}"),
            }
            session.print();
        }
        Command::MarkOrdered { case_id } => {
            let order = store.create_order_for_case(&CaseId::new(case_id.clone())).await?;
            println!("order {} linked to case {case_id}", order.order_number);
            Session::open(&backend, &settings, &case_id).await.print();
        }
    }

    Ok(())
}
