//! DynamoDB key-value backend
//!
//! Keys are stored as string attributes named by the [`TableSchema`].
//! Scans and queries project the key attributes only.

use crate::config::TableSchema;
use crate::{Item, ItemKey, KeyPage, KeyValueBackend, KvError, KvResult, PartitionQuery};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, WriteRequest};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;
use tracing::debug;

type AttributeMap = HashMap<String, AttributeValue>;

/// DynamoDB key-value backend
#[derive(Debug, Clone)]
pub struct DynamoDbBackend {
    client: Client,
    schema: TableSchema,
}

impl DynamoDbBackend {
    /// Use an already-configured client
    pub fn new(client: Client, schema: TableSchema) -> KvResult<Self> {
        schema.validate()?;
        Ok(Self { client, schema })
    }

    /// Build a client from the default provider chain
    pub async fn from_env(schema: TableSchema) -> KvResult<Self> {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&shared), schema)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn network(context: &str, error: impl std::fmt::Display) -> KvError {
        KvError::Network(format!("{}: {}", context, error))
    }

    fn key_attributes(&self, key: &ItemKey) -> KvResult<AttributeMap> {
        let mut map = AttributeMap::new();
        map.insert(
            self.schema.partition_key.clone(),
            AttributeValue::S(key.partition.clone()),
        );
        match (&self.schema.sort_key, &key.sort) {
            (Some(name), Some(sort)) => {
                map.insert(name.clone(), AttributeValue::S(sort.clone()));
            }
            (None, None) => {}
            (Some(name), None) => {
                return Err(KvError::InvalidKey(format!(
                    "key '{}' has no value for sort key '{}'",
                    key, name
                )))
            }
            (None, Some(_)) => {
                return Err(KvError::InvalidKey(format!(
                    "key '{}' has a sort key but table '{}' does not",
                    key, self.schema.table
                )))
            }
        }
        Ok(map)
    }

    fn key_from_attributes(&self, map: &AttributeMap) -> KvResult<ItemKey> {
        let partition = map
            .get(&self.schema.partition_key)
            .and_then(key_string)
            .ok_or_else(|| {
                KvError::Backend(format!(
                    "item is missing partition key '{}'",
                    self.schema.partition_key
                ))
            })?;
        let sort = match &self.schema.sort_key {
            Some(name) => Some(map.get(name).and_then(key_string).ok_or_else(|| {
                KvError::Backend(format!("item is missing sort key '{}'", name))
            })?),
            None => None,
        };
        Ok(ItemKey { partition, sort })
    }

    fn projection(&self) -> (String, HashMap<String, String>) {
        let mut names = HashMap::new();
        names.insert("#pk".to_string(), self.schema.partition_key.clone());
        let expression = match &self.schema.sort_key {
            Some(sort) => {
                names.insert("#sk".to_string(), sort.clone());
                "#pk, #sk".to_string()
            }
            None => "#pk".to_string(),
        };
        (expression, names)
    }

    fn page_from(&self, items: &[AttributeMap], last: Option<&AttributeMap>) -> KvResult<KeyPage> {
        let keys = items
            .iter()
            .map(|item| self.key_from_attributes(item))
            .collect::<KvResult<Vec<_>>>()?;
        let cursor = last.map(|map| self.key_from_attributes(map)).transpose()?;
        Ok(KeyPage { keys, cursor })
    }

    fn start_key(&self, cursor: Option<&ItemKey>) -> KvResult<Option<AttributeMap>> {
        cursor.map(|key| self.key_attributes(key)).transpose()
    }
}

fn key_string(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::S(s) | AttributeValue::N(s) => Some(s.clone()),
        _ => None,
    }
}

fn to_attribute(value: &serde_json::Value) -> AttributeValue {
    use serde_json::Value;
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

fn from_attribute(value: &AttributeValue) -> KvResult<serde_json::Value> {
    use serde_json::Value;
    Ok(match value {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => serde_json::from_str(n)?,
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::Ss(values) => Value::from(values.clone()),
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<KvResult<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| -> KvResult<(String, Value)> { Ok((k.clone(), from_attribute(v)?)) })
                .collect::<KvResult<serde_json::Map<_, _>>>()?,
        ),
        other => {
            return Err(KvError::Backend(format!(
                "unsupported attribute type: {:?}",
                other
            )))
        }
    })
}

#[async_trait]
impl KeyValueBackend for DynamoDbBackend {
    fn table(&self) -> &str {
        &self.schema.table
    }

    async fn put_item(&self, item: Item) -> KvResult<()> {
        let mut map = self.key_attributes(&item.key)?;
        for (name, value) in &item.attributes {
            if map.contains_key(name) {
                return Err(KvError::InvalidKey(format!(
                    "attribute '{}' collides with a key attribute",
                    name
                )));
            }
            map.insert(name.clone(), to_attribute(value));
        }

        self.client
            .put_item()
            .table_name(&self.schema.table)
            .set_item(Some(map))
            .send()
            .await
            .map_err(|e| Self::network("PutItem failed", e))?;
        Ok(())
    }

    async fn get_item(&self, key: &ItemKey) -> KvResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.schema.table)
            .set_key(Some(self.key_attributes(key)?))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| Self::network("GetItem failed", e))?;

        let Some(map) = output.item() else {
            return Ok(None);
        };

        let mut item = Item::new(self.key_from_attributes(map)?);
        for (name, value) in map {
            if *name == self.schema.partition_key || self.schema.sort_key.as_ref() == Some(name) {
                continue;
            }
            item.attributes.insert(name.clone(), from_attribute(value)?);
        }
        Ok(Some(item))
    }

    async fn scan_keys(&self, cursor: Option<&ItemKey>, limit: usize) -> KvResult<KeyPage> {
        let (projection, names) = self.projection();
        let output = self
            .client
            .scan()
            .table_name(&self.schema.table)
            .projection_expression(projection)
            .set_expression_attribute_names(Some(names))
            .set_exclusive_start_key(self.start_key(cursor)?)
            .limit(limit.clamp(1, i32::MAX as usize) as i32)
            .send()
            .await
            .map_err(|e| Self::network("Scan failed", e))?;

        self.page_from(output.items(), output.last_evaluated_key())
    }

    async fn query_keys(
        &self,
        query: &PartitionQuery,
        cursor: Option<&ItemKey>,
        limit: usize,
    ) -> KvResult<KeyPage> {
        let (projection, names) = self.projection();
        let mut request = self
            .client
            .query()
            .table_name(&self.schema.table)
            .projection_expression(projection)
            .set_expression_attribute_names(Some(names))
            .expression_attribute_values(":pk", AttributeValue::S(query.partition.clone()))
            .set_exclusive_start_key(self.start_key(cursor)?)
            .limit(limit.clamp(1, i32::MAX as usize) as i32);

        request = match (&query.sort_prefix, &self.schema.sort_key) {
            (Some(prefix), Some(_)) => request
                .key_condition_expression("#pk = :pk AND begins_with(#sk, :prefix)")
                .expression_attribute_values(":prefix", AttributeValue::S(prefix.clone())),
            (Some(_), None) => {
                return Err(KvError::Configuration(format!(
                    "table '{}' has no sort key to filter on",
                    self.schema.table
                )))
            }
            (None, _) => request.key_condition_expression("#pk = :pk"),
        };

        let output = request
            .send()
            .await
            .map_err(|e| Self::network("Query failed", e))?;

        self.page_from(output.items(), output.last_evaluated_key())
    }

    async fn batch_delete(&self, keys: &[ItemKey]) -> KvResult<Vec<ItemKey>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if keys.len() > self.max_batch_delete() {
            return Err(KvError::Backend(format!(
                "batch of {} keys exceeds the delete limit of {}",
                keys.len(),
                self.max_batch_delete()
            )));
        }

        let requests = keys
            .iter()
            .map(|key| -> KvResult<WriteRequest> {
                let delete = DeleteRequest::builder()
                    .set_key(Some(self.key_attributes(key)?))
                    .build()
                    .map_err(|e| KvError::InvalidKey(e.to_string()))?;
                Ok(WriteRequest::builder().delete_request(delete).build())
            })
            .collect::<KvResult<Vec<_>>>()?;

        let output = self
            .client
            .batch_write_item()
            .request_items(self.schema.table.clone(), requests)
            .send()
            .await
            .map_err(|e| Self::network("BatchWriteItem failed", e))?;

        let unprocessed = output
            .unprocessed_items()
            .and_then(|tables| tables.get(&self.schema.table))
            .map(|requests| {
                requests
                    .iter()
                    .filter_map(|request| request.delete_request())
                    .map(|delete| self.key_from_attributes(delete.key()))
                    .collect::<KvResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        debug!(
            table = %self.schema.table,
            requested = keys.len(),
            unprocessed = unprocessed.len(),
            "BatchWriteItem completed"
        );
        Ok(unprocessed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_conversion_preserves_structure() {
        let value = json!({"name": "grove", "tags": ["a", "b"], "count": 3, "active": true, "none": null});
        let converted = from_attribute(&to_attribute(&value)).unwrap();
        assert_eq!(converted, value);
    }

    #[test]
    fn test_key_string_accepts_numbers() {
        assert_eq!(key_string(&AttributeValue::N("42".into())), Some("42".to_string()));
        assert_eq!(key_string(&AttributeValue::Bool(true)), None);
    }
}
