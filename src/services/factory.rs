use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    sap::SapGateway,
    services::{
        batches::BatchService, labels::LabelService, line_items::LineItemService,
        lookups::LookupService, posting::PostingService,
    },
};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    db_pool: Arc<DbPool>,
    sap: Arc<dyn SapGateway>,
    config: Arc<AppConfig>,
}

impl ServiceFactory {
    pub fn new(db_pool: Arc<DbPool>, sap: Arc<dyn SapGateway>, config: Arc<AppConfig>) -> Self {
        Self {
            db_pool,
            sap,
            config,
        }
    }

    pub fn batch_service(&self) -> BatchService {
        BatchService::new(
            self.db_pool.clone(),
            u64::from(self.config.api_default_page_size),
            u64::from(self.config.api_max_page_size),
        )
    }

    pub fn line_item_service(&self) -> LineItemService {
        LineItemService::new(
            self.db_pool.clone(),
            self.sap.clone(),
            self.config.sap.default_warehouse.clone(),
        )
    }

    pub fn posting_service(&self) -> PostingService {
        PostingService::new(
            self.db_pool.clone(),
            self.sap.clone(),
            (&self.config.sap).into(),
        )
    }

    pub fn label_service(&self) -> LabelService {
        LabelService::new(self.db_pool.clone())
    }

    pub fn lookup_service(&self) -> LookupService {
        LookupService::new(self.db_pool.clone(), self.sap.clone())
    }

    /// Gets a reference to the database pool
    pub fn db_pool(&self) -> &Arc<DbPool> {
        &self.db_pool
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub batches: Arc<BatchService>,
    pub lines: Arc<LineItemService>,
    pub posting: Arc<PostingService>,
    pub labels: Arc<LabelService>,
    pub lookups: Arc<LookupService>,
}

impl ServiceContainer {
    pub fn new(factory: &ServiceFactory) -> Self {
        Self {
            batches: Arc::new(factory.batch_service()),
            lines: Arc::new(factory.line_item_service()),
            posting: Arc::new(factory.posting_service()),
            labels: Arc::new(factory.label_service()),
            lookups: Arc::new(factory.lookup_service()),
        }
    }
}
