// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! PostgreSQL + pgvector backend

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

use crate::core::config::ClientConfig;
use crate::core::metadata_filter::Predicate;
use crate::core::types::{Metadata, Record};
use crate::index::IndexDescriptor;
use crate::storage::sql::{quote_ident, render_predicate, SqlParam, SqlParams};
use crate::storage::{
    parse_vector_literal, vector_literal, Backend, BackendError, ExtensionVersion, SearchRequest,
    SearchRow, TableRef,
};

/// Table holding one index descriptor per collection.
const DESCRIPTOR_TABLE: &str = "_vecs_indexes";

pub struct PostgresBackend {
    pool: Pool,
}

impl PostgresBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.connection_string.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(config.pool_size));

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    fn descriptor_table(schema: &str) -> String {
        format!("{}.{}", quote_ident(schema), quote_ident(DESCRIPTOR_TABLE))
    }

}

/// Longest collection-name prefix kept in a metadata index name.
const META_INDEX_PREFIX_BYTES: usize = 32;

/// `ix_meta_<prefix>_<hash>`: at most 57 bytes, so the server never truncates
/// it, and distinct for collections sharing a long prefix.
fn metadata_index_name(collection: &str) -> String {
    let mut cut = collection.len().min(META_INDEX_PREFIX_BYTES);
    while !collection.is_char_boundary(cut) {
        cut -= 1;
    }
    let hash = blake3::hash(collection.as_bytes());
    format!("ix_meta_{}_{}", &collection[..cut], &hash.to_hex()[..16])
}

fn bind(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| match p {
            SqlParam::Text(s) => s as &(dyn ToSql + Sync),
            SqlParam::Json(v) => v as &(dyn ToSql + Sync),
            SqlParam::Int(i) => i as &(dyn ToSql + Sync),
        })
        .collect()
}

fn metadata_from(value: JsonValue) -> Result<Metadata, BackendError> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(BackendError::MalformedRow(format!(
            "metadata is not an object: {}",
            other
        ))),
    }
}

fn record_from_row(row: &Row) -> Result<Record, BackendError> {
    let id: String = row.try_get(0)?;
    let vec: String = row.try_get(1)?;
    let metadata: JsonValue = row.try_get(2)?;
    Ok(Record {
        id,
        vector: parse_vector_literal(&vec)?,
        metadata: metadata_from(metadata)?,
    })
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn extension_version(&self) -> Result<ExtensionVersion, BackendError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "select extversion from pg_extension where extname = 'vector'",
                &[],
            )
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get(0)?;
                ExtensionVersion::parse(&raw)
            }
            None => Err(BackendError::MissingExtension),
        }
    }

    async fn ensure_schema(&self, schema: &str) -> Result<(), BackendError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.batch_execute(&format!(
            "create schema if not exists {schema};
             create extension if not exists vector;
             create table if not exists {descriptors} (
                 collection text primary key,
                 descriptor jsonb not null
             );",
            schema = quote_ident(schema),
            descriptors = Self::descriptor_table(schema),
        ))
        .await?;
        tx.commit().await?;
        info!("Schema {} ready", schema);
        Ok(())
    }

    async fn collection_dimension(&self, table: &TableRef) -> Result<Option<usize>, BackendError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "select a.atttypmod
                 from pg_attribute a
                 join pg_class c on a.attrelid = c.oid
                 join pg_namespace n on c.relnamespace = n.oid
                 where n.nspname = $1 and c.relname = $2 and c.relkind = 'r'
                   and a.attname = 'vec'",
                &[&table.schema, &table.name],
            )
            .await?;

        match row {
            Some(row) => {
                let typmod: i32 = row.try_get(0)?;
                usize::try_from(typmod).map(Some).map_err(|_| {
                    BackendError::MalformedRow(format!("vector column of {} has no dimension", table))
                })
            }
            None => Ok(None),
        }
    }

    async fn list_collections(&self, schema: &str) -> Result<Vec<String>, BackendError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "select c.relname
                 from pg_class c
                 join pg_namespace n on c.relnamespace = n.oid
                 where n.nspname = $1 and c.relkind = 'r' and left(c.relname, 1) <> '_'
                 order by c.relname",
                &[&schema],
            )
            .await?;

        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(BackendError::from))
            .collect()
    }

    async fn create_collection(
        &self,
        table: &TableRef,
        dimension: usize,
    ) -> Result<(), BackendError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.batch_execute(&format!(
            "create table if not exists {table} (
                 id text primary key,
                 vec vector({dimension}) not null,
                 metadata jsonb not null default '{{}}'::jsonb
             );
             create index if not exists {meta_index} on {table} using gin (metadata jsonb_path_ops);",
            table = table.qualified(),
            dimension = dimension,
            meta_index = quote_ident(&metadata_index_name(&table.name)),
        ))
        .await?;
        tx.commit().await?;
        info!("Created collection {} with dimension {}", table, dimension);
        Ok(())
    }

    async fn drop_collection(&self, table: &TableRef) -> Result<(), BackendError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.batch_execute(&format!("drop table if exists {}", table.qualified()))
            .await?;
        tx.execute(
            &format!(
                "delete from {} where collection = $1",
                Self::descriptor_table(&table.schema)
            ),
            &[&table.name],
        )
        .await?;
        tx.commit().await?;
        info!("Dropped collection {}", table);
        Ok(())
    }

    async fn count(&self, table: &TableRef) -> Result<usize, BackendError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(&format!("select count(*) from {}", table.qualified()), &[])
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as usize)
    }

    async fn upsert(&self, table: &TableRef, records: &[Record]) -> Result<(), BackendError> {
        if records.is_empty() {
            return Ok(());
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let vecs: Vec<String> = records.iter().map(|r| vector_literal(&r.vector)).collect();
        let metadata: Vec<JsonValue> = records
            .iter()
            .map(|r| JsonValue::Object(r.metadata.clone()))
            .collect();

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute(
            &format!(
                "insert into {} (id, vec, metadata)
                 select * from unnest($1::text[], $2::text[]::vector[], $3::jsonb[])
                 on conflict (id) do update
                 set vec = excluded.vec, metadata = excluded.metadata",
                table.qualified()
            ),
            &[&ids, &vecs, &metadata],
        )
        .await?;
        tx.commit().await?;
        debug!("Upserted {} records into {}", records.len(), table);
        Ok(())
    }

    async fn fetch(&self, table: &TableRef, ids: &[String]) -> Result<Vec<Record>, BackendError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let rows = tx
            .query(
                &format!(
                    "select id, vec::text, metadata from {} where id = any($1::text[])",
                    table.qualified()
                ),
                &[&ids],
            )
            .await?;
        tx.commit().await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn delete_ids(
        &self,
        table: &TableRef,
        ids: &[String],
    ) -> Result<Vec<String>, BackendError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let rows = tx
            .query(
                &format!(
                    "delete from {} where id = any($1::text[]) returning id",
                    table.qualified()
                ),
                &[&ids],
            )
            .await?;
        tx.commit().await?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(BackendError::from))
            .collect()
    }

    async fn delete_matching(
        &self,
        table: &TableRef,
        predicate: &Predicate,
    ) -> Result<Vec<String>, BackendError> {
        let mut params = SqlParams::new();
        let clause = render_predicate(predicate, &mut params);
        let statement = format!(
            "delete from {} where {} returning id",
            table.qualified(),
            clause
        );

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let rows = tx.query(&statement, &bind(params.as_slice())).await?;
        tx.commit().await?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(BackendError::from))
            .collect()
    }

    async fn search(
        &self,
        table: &TableRef,
        request: &SearchRequest,
    ) -> Result<Vec<SearchRow>, BackendError> {
        let mut params = SqlParams::new();
        let query_vec = params.push(SqlParam::Text(vector_literal(&request.vector)));
        let distance = format!("vec {} {}::vector", request.measure.sql_operator(), query_vec);

        let mut columns = vec!["id".to_string()];
        if request.include_value {
            columns.push(distance.clone());
        }
        if request.include_metadata {
            columns.push("metadata".to_string());
        }
        if request.include_vector {
            columns.push("vec::text".to_string());
        }

        let where_clause = match &request.predicate {
            Some(predicate) => format!(" where {}", render_predicate(predicate, &mut params)),
            None => String::new(),
        };
        let limit = params.push(SqlParam::Int(request.limit as i64));

        let statement = format!(
            "select {} from {}{} order by {} limit {}",
            columns.join(", "),
            table.qualified(),
            where_clause,
            distance,
            limit
        );

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute(
            "select set_config('ivfflat.probes', $1, true)",
            &[&request.probes.to_string()],
        )
        .await?;
        if let Some(ef_search) = request.ef_search {
            tx.execute(
                "select set_config('hnsw.ef_search', $1, true)",
                &[&ef_search.to_string()],
            )
            .await?;
        }
        let rows = tx.query(&statement, &bind(params.as_slice())).await?;
        tx.commit().await?;

        rows.iter()
            .map(|row| -> Result<SearchRow, BackendError> {
                let mut col = 0;
                let mut next = || {
                    col += 1;
                    col
                };
                let id: String = row.try_get(0)?;
                let distance = if request.include_value {
                    Some(row.try_get::<_, f64>(next())?)
                } else {
                    None
                };
                let metadata = if request.include_metadata {
                    Some(metadata_from(row.try_get(next())?)?)
                } else {
                    None
                };
                let vector = if request.include_vector {
                    let raw: String = row.try_get(next())?;
                    Some(parse_vector_literal(&raw)?)
                } else {
                    None
                };
                Ok(SearchRow {
                    id,
                    distance,
                    metadata,
                    vector,
                })
            })
            .collect()
    }

    async fn index_descriptor(
        &self,
        table: &TableRef,
    ) -> Result<Option<IndexDescriptor>, BackendError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "select descriptor from {} where collection = $1",
                    Self::descriptor_table(&table.schema)
                ),
                &[&table.name],
            )
            .await?;

        match row {
            Some(row) => {
                let raw: JsonValue = row.try_get(0)?;
                serde_json::from_value(raw)
                    .map(Some)
                    .map_err(|e| BackendError::MalformedRow(format!("index descriptor: {}", e)))
            }
            None => Ok(None),
        }
    }

    async fn replace_index(
        &self,
        table: &TableRef,
        previous: Option<&IndexDescriptor>,
        next: &IndexDescriptor,
    ) -> Result<(), BackendError> {
        let descriptor = serde_json::to_value(next)
            .map_err(|e| BackendError::MalformedRow(format!("index descriptor: {}", e)))?;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        if let Some(previous) = previous {
            tx.batch_execute(&format!(
                "drop index if exists {}.{}",
                quote_ident(&table.schema),
                quote_ident(&previous.name)
            ))
            .await?;
        }
        tx.batch_execute(&format!(
            "create index {} on {} using {} (vec {}) with ({})",
            quote_ident(&next.name),
            table.qualified(),
            next.method(),
            next.measure.operator_class(),
            next.parameters.with_clause()
        ))
        .await?;
        tx.execute(
            &format!(
                "insert into {} (collection, descriptor) values ($1, $2)
                 on conflict (collection) do update set descriptor = excluded.descriptor",
                Self::descriptor_table(&table.schema)
            ),
            &[&table.name, &descriptor],
        )
        .await?;
        tx.commit().await?;
        info!("Built index {} on {}", next.name, table);
        Ok(())
    }

    async fn drop_index(
        &self,
        table: &TableRef,
        descriptor: &IndexDescriptor,
    ) -> Result<(), BackendError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.batch_execute(&format!(
            "drop index if exists {}.{}",
            quote_ident(&table.schema),
            quote_ident(&descriptor.name)
        ))
        .await?;
        tx.execute(
            &format!(
                "delete from {} where collection = $1",
                Self::descriptor_table(&table.schema)
            ),
            &[&table.name],
        )
        .await?;
        tx.commit().await?;
        info!("Dropped index {} on {}", descriptor.name, table);
        Ok(())
    }

    fn close(&self) {
        self.pool.close();
    }
}
