// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Client sessions
//!
//! A [`Client`] owns the backend connection, probes the engine's capabilities
//! once, and hands out [`Collection`]s.

use dashmap::DashSet;
use std::sync::Arc;
use tracing::info;

use crate::collection::{resolve_dimension, validate_name, Collection, CollectionOptions};
use crate::core::config::ClientConfig;
use crate::core::error::{Result, VecsError};
use crate::storage::{Backend, Capabilities, PostgresBackend, TableRef};

/// State shared by a client and every collection it hands out.
pub(crate) struct ClientContext {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) capabilities: Capabilities,
    pub(crate) config: ClientConfig,
}

pub struct Client {
    context: Arc<ClientContext>,
    schemas: DashSet<String>,
}

impl Client {
    /// Connect to PostgreSQL with default settings.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        Self::from_config(ClientConfig::new(connection_string)).await
    }

    pub async fn from_config(config: ClientConfig) -> Result<Self> {
        if !config.is_valid() {
            return Err(VecsError::arg(
                "client config needs a schema and non-zero pool and batch sizes",
            ));
        }
        let backend = PostgresBackend::new(&config)?;
        Self::with_backend(Arc::new(backend), config).await
    }

    /// Build a client over any backend, creating the configured schema.
    pub async fn with_backend(backend: Arc<dyn Backend>, config: ClientConfig) -> Result<Self> {
        if !config.is_valid() {
            return Err(VecsError::arg(
                "client config needs a schema and non-zero pool and batch sizes",
            ));
        }

        backend.ensure_schema(&config.schema).await?;
        let version = backend.extension_version().await?;
        info!("Connected; vector extension {}", version);

        let schemas = DashSet::new();
        schemas.insert(config.schema.clone());

        Ok(Self {
            context: Arc::new(ClientContext {
                backend,
                capabilities: Capabilities::new(version),
                config,
            }),
            schemas,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.context.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.context.capabilities
    }

    pub fn supports_hnsw(&self) -> bool {
        self.context.capabilities.supports_hnsw()
    }

    async fn ensure_schema(&self, schema: &str) -> Result<()> {
        if !self.schemas.contains(schema) {
            self.context.backend.ensure_schema(schema).await?;
            self.schemas.insert(schema.to_string());
        }
        Ok(())
    }

    fn table(&self, name: &str, schema: Option<&str>) -> TableRef {
        TableRef::new(schema.unwrap_or(&self.context.config.schema), name)
    }

    async fn open(
        &self,
        table: TableRef,
        dimension: usize,
        options: CollectionOptions,
    ) -> Result<Collection> {
        let index = self.context.backend.index_descriptor(&table).await?;
        Ok(Collection::new(
            table,
            dimension,
            options.adapter,
            Arc::clone(&self.context),
            index,
        ))
    }

    /// Open a collection, creating it if needed
    ///
    /// The dimension comes from `options.dimension`, the adapter, or the
    /// existing table; sources that disagree fail with `MismatchedDimension`.
    pub async fn get_or_create_collection(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> Result<Collection> {
        validate_name(name)?;
        let table = self.table(name, options.schema.as_deref());

        let adapter_dimension = options.adapter.as_ref().and_then(|a| a.exported_dimension());
        // Reject conflicting declarations before touching the database.
        if options.dimension.is_some() || adapter_dimension.is_some() {
            resolve_dimension(options.dimension, adapter_dimension, None)?;
        }

        self.ensure_schema(&table.schema).await?;
        let stored = self.context.backend.collection_dimension(&table).await?;
        let dimension = resolve_dimension(options.dimension, adapter_dimension, stored)?;

        if stored.is_none() {
            self.context
                .backend
                .create_collection(&table, dimension)
                .await?;
        }
        self.open(table, dimension, options).await
    }

    /// Create a new collection; fails if it already exists.
    pub async fn create_collection(&self, name: &str, dimension: usize) -> Result<Collection> {
        validate_name(name)?;
        resolve_dimension(Some(dimension), None, None)?;
        let table = self.table(name, None);

        self.ensure_schema(&table.schema).await?;
        if self
            .context
            .backend
            .collection_dimension(&table)
            .await?
            .is_some()
        {
            return Err(VecsError::CollectionAlreadyExists(format!(
                "Collection with requested name already exists: {}",
                name
            )));
        }

        self.context
            .backend
            .create_collection(&table, dimension)
            .await?;
        self.open(table, dimension, CollectionOptions::new()).await
    }

    /// Open an existing collection.
    pub async fn get_collection(&self, name: &str) -> Result<Collection> {
        let table = self.table(name, None);
        let dimension = self
            .context
            .backend
            .collection_dimension(&table)
            .await?
            .ok_or_else(|| {
                VecsError::CollectionNotFound(format!(
                    "No collection found with requested name: {}",
                    name
                ))
            })?;
        self.open(table, dimension, CollectionOptions::new()).await
    }

    /// All collections in `schema` (the configured one when `None`).
    pub async fn list_collections(&self, schema: Option<&str>) -> Result<Vec<Collection>> {
        let schema = schema.unwrap_or(&self.context.config.schema).to_string();
        let names = self.context.backend.list_collections(&schema).await?;

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            let table = TableRef::new(schema.clone(), name);
            // A table dropped between listing and describing is skipped.
            if let Some(dimension) = self.context.backend.collection_dimension(&table).await? {
                collections.push(self.open(table, dimension, CollectionOptions::new()).await?);
            }
        }
        Ok(collections)
    }

    /// Drop a collection and its index; absent collections are ignored.
    pub async fn delete_collection(&self, name: &str, schema: Option<&str>) -> Result<()> {
        let table = self.table(name, schema);
        self.context.backend.drop_collection(&table).await?;
        Ok(())
    }

    /// Release pooled connections.
    pub fn disconnect(self) {
        self.context.backend.close();
        info!("Disconnected");
    }
}
