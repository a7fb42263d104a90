//! # Ledger Facade
//!
//! Single entry point owning the database and every service.
//!
//! ## Usage
//! ```rust,ignore
//! let config = LedgerConfig::load(None)?;
//! let ledger = Ledger::open(&config).await?;
//!
//! let actor = Actor::new(user_id, "sales_advisor");
//! let negotiation = ledger.negotiations().create(&actor, input).await?.into_value();
//! ledger.sources().add_source(&actor, mortgage).await?;
//! ledger.lifecycle().close_financially(&actor, &negotiation.id).await?;
//! ```

use ledger_db::Database;
use tracing::info;

use crate::audit::AuditRecorder;
use crate::config::LedgerConfig;
use crate::context::LedgerContext;
use crate::error::LedgerResult;
use crate::installments::InstallmentRecorder;
use crate::lifecycle::NegotiationStateMachine;
use crate::negotiations::NegotiationService;
use crate::reconciler::Reconciler;
use crate::sources::SourceManager;
use crate::versions::VersionService;

/// The negotiation ledger. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct Ledger {
    ctx: LedgerContext,
    negotiations: NegotiationService,
    sources: SourceManager,
    installments: InstallmentRecorder,
    reconciler: Reconciler,
    lifecycle: NegotiationStateMachine,
    versions: VersionService,
}

impl Ledger {
    /// Connects to the configured database (running migrations) and builds
    /// the services.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Self::new(db, config)
    }

    /// Builds the services on an existing database handle.
    pub fn new(db: Database, config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let ctx = LedgerContext::new(db, config);

        info!(
            reference_prefix = %config.ledger.reference_prefix,
            max_attempts = config.concurrency.max_attempts,
            auto_complete = config.ledger.auto_complete,
            "Ledger ready"
        );

        Ok(Ledger {
            negotiations: NegotiationService::new(ctx.clone()),
            sources: SourceManager::new(ctx.clone()),
            installments: InstallmentRecorder::new(ctx.clone()),
            reconciler: Reconciler::new(ctx.clone()),
            lifecycle: NegotiationStateMachine::new(ctx.clone()),
            versions: VersionService::new(ctx.clone()),
            ctx,
        })
    }

    pub fn negotiations(&self) -> &NegotiationService {
        &self.negotiations
    }

    pub fn sources(&self) -> &SourceManager {
        &self.sources
    }

    pub fn installments(&self) -> &InstallmentRecorder {
        &self.installments
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn lifecycle(&self) -> &NegotiationStateMachine {
        &self.lifecycle
    }

    pub fn versions(&self) -> &VersionService {
        &self.versions
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.ctx.audit
    }

    pub fn database(&self) -> &Database {
        self.ctx.database()
    }

    /// Closes the connection pool. Later calls fail with a storage error.
    pub async fn close(&self) {
        self.ctx.db.close().await;
    }
}
