// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Qdrant-backed VectorStore.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors_config, Condition, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, Filter, GetCollectionInfoResponse, ListValue, PointId,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, Struct, UpsertPointsBuilder,
    Value as QValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{info, warn};

use parley_config::model::VectorConfig;
use parley_core::types::{Payload, PayloadFilter, ScoredPoint, VectorPoint};
use parley_core::{AdapterType, HealthStatus, ParleyError, PluginAdapter, VectorStore};

/// Vector store client bound to one Qdrant collection.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    /// Declared dimensionality; zero until `ensure_collection` runs.
    dimensions: AtomicUsize,
}

fn qdrant_err(context: &str) -> impl FnOnce(qdrant_client::QdrantError) -> ParleyError + '_ {
    move |e| ParleyError::VectorStore {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

impl QdrantVectorStore {
    /// Connects to the configured Qdrant endpoint.
    pub fn connect(config: &VectorConfig) -> Result<Self, ParleyError> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(api_key) = &config.api_key {
            builder = builder.api_key(api_key.clone());
            info!("Qdrant connection using API key authentication");
        }
        let client = builder.build().map_err(qdrant_err("failed to build Qdrant client"))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimensions: AtomicUsize::new(0),
        })
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), ParleyError> {
        match self.dimensions.load(Ordering::Acquire) {
            0 => Err(ParleyError::vector_store("collection has not been created")),
            expected if expected != actual => {
                Err(ParleyError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

/// Size of the collection's unnamed vector, if it has one.
fn stored_vector_size(info: &GetCollectionInfoResponse) -> Option<usize> {
    let config = info
        .result
        .as_ref()?
        .config
        .as_ref()?
        .params
        .as_ref()?
        .vectors_config
        .as_ref()?
        .config
        .as_ref()?;
    match config {
        vectors_config::Config::Params(params) => usize::try_from(params.size).ok(),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

/// An existing collection must have been created for `declared` dimensions.
fn verify_stored_size(
    collection: &str,
    stored: Option<usize>,
    declared: usize,
) -> Result<(), ParleyError> {
    match stored {
        Some(size) if size != declared => Err(ParleyError::DimensionMismatch {
            expected: size,
            actual: declared,
        }),
        Some(_) => Ok(()),
        None => {
            warn!(collection, "collection has no single vector config, dimensions unverified");
            Ok(())
        }
    }
}

/// Converts a payload filter into a Qdrant `must` filter of keyword matches.
fn to_filter(filter: &PayloadFilter) -> Filter {
    Filter::must(
        filter
            .must
            .iter()
            .map(|(field, value)| Condition::matches(field.clone(), value.clone()))
            .collect::<Vec<_>>(),
    )
}

fn json_to_qdrant(value: Value) -> QValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .into_iter()
                .map(|(k, v)| (k, json_to_qdrant(v)))
                .collect(),
        }),
    };
    QValue { kind: Some(kind) }
}

fn qdrant_to_json(value: QValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map_or(Value::Null, Value::Number)
        }
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect(),
        ),
    }
}

fn to_qdrant_payload(payload: Payload) -> HashMap<String, QValue> {
    payload
        .into_iter()
        .map(|(k, v)| (k, json_to_qdrant(v)))
        .collect()
}

fn from_qdrant_payload(payload: HashMap<String, QValue>) -> Payload {
    payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_to_json(v)))
        .collect()
}

fn point_id_string(id: Option<PointId>) -> String {
    match id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl PluginAdapter for QdrantVectorStore {
    fn name(&self) -> &str {
        "qdrant"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        match self.client.health_check().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), ParleyError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(qdrant_err("collection_exists failed"))?;

        if exists {
            let info = self
                .client
                .collection_info(&self.collection)
                .await
                .map_err(qdrant_err("collection_info failed"))?;
            verify_stored_size(&self.collection, stored_vector_size(&info), dimensions)?;
        } else {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(dimensions as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(qdrant_err("create_collection failed"))?;
            info!(collection = %self.collection, dimensions, "created Qdrant collection");
        }

        match self
            .dimensions
            .compare_exchange(0, dimensions, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(existing) if existing == dimensions => Ok(()),
            Err(existing) => Err(ParleyError::DimensionMismatch {
                expected: existing,
                actual: dimensions,
            }),
        }
    }

    async fn upsert(&self, point: VectorPoint) -> Result<(), ParleyError> {
        self.check_dimensions(point.vector.len())?;
        let qpoint = PointStruct::new(point.id, point.vector, to_qdrant_payload(point.payload));
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![qpoint]).wait(true))
            .await
            .map_err(qdrant_err("upsert failed"))?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: &PayloadFilter,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, ParleyError> {
        self.check_dimensions(vector.len())?;
        let request = SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64)
            .filter(to_filter(filter))
            .score_threshold(score_threshold)
            .with_payload(true);

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(qdrant_err("search failed"))?;

        Ok(response
            .result
            .into_iter()
            // The server applies the threshold; re-check so callers can rely on it.
            .filter(|p| p.score >= score_threshold)
            .map(|p| ScoredPoint {
                id: point_id_string(p.id),
                score: p.score,
                payload: from_qdrant_payload(p.payload),
            })
            .collect())
    }

    async fn scroll(
        &self,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<VectorPoint>, ParleyError> {
        let request = ScrollPointsBuilder::new(&self.collection)
            .filter(to_filter(filter))
            .limit(limit as u32)
            .with_payload(true)
            .with_vectors(false);

        let response = self
            .client
            .scroll(request)
            .await
            .map_err(qdrant_err("scroll failed"))?;

        Ok(response
            .result
            .into_iter()
            .map(|p| VectorPoint {
                id: point_id_string(p.id),
                vector: Vec::new(),
                payload: from_qdrant_payload(p.payload),
            })
            .collect())
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<(), ParleyError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(to_filter(filter))
                    .wait(true),
            )
            .await
            .map_err(qdrant_err("delete failed"))?;
        Ok(())
    }
}
