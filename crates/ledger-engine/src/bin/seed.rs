//! # Seed Data Generator
//!
//! Populates a ledger database with sample negotiations for development.
//!
//! ## Usage
//! ```bash
//! # 20 negotiations (default) into the configured database
//! cargo run -p ledger-engine --bin seed
//!
//! # Custom amount and database path
//! cargo run -p ledger-engine --bin seed -- --count 200 --db ./data/ledger.db
//!
//! # With a config file and verbose logging
//! RUST_LOG=ledger_engine=debug cargo run -p ledger-engine --bin seed -- --config ./ledger.toml
//! ```
//!
//! ## Generated Data
//! Each negotiation gets a down payment and one of the financed sources,
//! is closed financially, and receives one to three installments. Every
//! fourth negotiation is paid in full and completes automatically.

use chrono::Utc;
use ledger_core::{Actor, Money, PaymentMethod, SourceKind};
use ledger_engine::{Ledger, LedgerConfig, NewInstallment, NewNegotiation, NewSource};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Sale prices in currency units.
const PRICES: &[i64] = &[95_000_000, 120_000_000, 150_000_000, 185_000_000];

/// Financed source kinds, with entity and reference number.
const FINANCING: &[(SourceKind, Option<&str>, Option<&str>)] = &[
    (SourceKind::MortgageLoan, Some("Banco Agrario"), Some("HL-2026-0142")),
    (SourceKind::NationalHousingSubsidy, None, Some("RES-7781")),
    (SourceKind::CompensationFundSubsidy, Some("Comfandi"), None),
];

const METHODS: &[PaymentMethod] = &[
    PaymentMethod::BankTransfer,
    PaymentMethod::Cash,
    PaymentMethod::Check,
    PaymentMethod::Card,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 20;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Negotiation Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of negotiations to generate (default: 20)");
                println!("  -d, --db <PATH>      Database file path (default: from config)");
                println!("      --config <PATH>  Config file (default: project config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }

    println!("Negotiation Ledger Seed Data Generator");
    println!("======================================");
    println!("Database:     {}", config.database_path().display());
    println!("Negotiations: {}", count);
    println!();

    let ledger = Ledger::open(&config).await?;
    let actor = Actor::new(Uuid::new_v4().to_string(), "seed");

    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut installments = 0;

    for n in 0..count {
        match seed_negotiation(&ledger, &actor, n).await {
            Ok(recorded) => {
                generated += 1;
                installments += recorded;
            }
            Err(e) => eprintln!("Failed to seed negotiation {}: {}", n, e),
        }
    }

    println!();
    println!(
        "Generated {} negotiations and {} installments in {:?}",
        generated,
        installments,
        start.elapsed()
    );

    for summary in ledger.audit().module_summary().await? {
        println!(
            "  {:<13} {:>5} events ({} creates, {} updates, {} deletes)",
            summary.module.to_string(),
            summary.event_count,
            summary.creates,
            summary.updates,
            summary.deletes
        );
    }
    if ledger.audit().degraded_count() > 0 {
        println!("  {} audit records could not be written", ledger.audit().degraded_count());
    }

    ledger.close().await;
    Ok(())
}

/// Creates one negotiation with two sources and returns how many
/// installments were recorded.
async fn seed_negotiation(ledger: &Ledger, actor: &Actor, n: usize) -> Result<usize, Box<dyn std::error::Error>> {
    let price = Money::from_units(PRICES[n % PRICES.len()]);
    let down_payment = Money::from_cents(price.cents() / 5);
    let financed = price - down_payment;

    let negotiation = ledger
        .negotiations()
        .create(
            actor,
            NewNegotiation {
                client_id: Uuid::new_v4().to_string(),
                housing_unit_id: Uuid::new_v4().to_string(),
                negotiated_price: price,
                discount: Money::zero(),
                notes: Some(format!("Seeded negotiation #{}", n + 1)),
            },
        )
        .await?
        .into_value();

    let down = ledger
        .sources()
        .add_source(
            actor,
            NewSource {
                negotiation_id: negotiation.id.clone(),
                kind: SourceKind::InitialDownPayment,
                approved_amount: down_payment,
                entity: None,
                reference_number: None,
            },
        )
        .await?
        .into_value();

    let (kind, entity, reference) = FINANCING[n % FINANCING.len()];
    let loan = ledger
        .sources()
        .add_source(
            actor,
            NewSource {
                negotiation_id: negotiation.id.clone(),
                kind,
                approved_amount: financed,
                entity: entity.map(str::to_string),
                reference_number: reference.map(str::to_string),
            },
        )
        .await?
        .into_value();

    ledger.lifecycle().close_financially(actor, &negotiation.id).await?;

    let today = Utc::now().date_naive();
    let parts = 1 + n % 3;
    let part = Money::from_cents(down_payment.cents() / parts as i64);
    for p in 0..parts {
        let amount = if p + 1 == parts {
            down_payment - Money::from_cents(part.cents() * (parts as i64 - 1))
        } else {
            part
        };
        ledger
            .installments()
            .record_installment(
                actor,
                NewInstallment {
                    negotiation_id: negotiation.id.clone(),
                    source_id: down.id.clone(),
                    amount,
                    disbursed_on: today,
                    method: METHODS[(n + p) % METHODS.len()],
                    notes: None,
                    external_reference: None,
                },
            )
            .await?;
    }
    ledger.lifecycle().activate(actor, &negotiation.id).await?;

    let mut recorded = parts;
    if n % 4 == 0 {
        ledger
            .installments()
            .record_installment(
                actor,
                NewInstallment {
                    negotiation_id: negotiation.id.clone(),
                    source_id: loan.id.clone(),
                    amount: financed,
                    disbursed_on: today,
                    method: PaymentMethod::BankTransfer,
                    notes: Some("Disbursement by financing entity".to_string()),
                    external_reference: loan.reference_number.clone(),
                },
            )
            .await?;
        recorded += 1;
    }

    Ok(recorded)
}
