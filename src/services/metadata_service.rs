use super::{
    MetadataService,
    record_store::{NewRecord, RecordQuery, RecordStore, lookup, parse_json_path},
};
use crate::{
    auth::Principal,
    errors::{ServiceError, ServiceResult},
    models::{
        common::{Paging, format_time, page_links, push_query, reject_filter, resolve_at_time},
        metadata::{
            AddMetaRT, AddPayload, ListMetaRT, MetadataListItemRT, MetadataListPayload,
            MetadataRecordRT, UpdateRecordPayload,
        },
    },
};
use async_trait::async_trait;
use sqlx::SqlitePool;

const CONTENT_TYPE: &str = "application/json";

pub struct SqliteMetadataService {
    store: RecordStore,
    public_url: String,
}

impl SqliteMetadataService {
    pub fn new(db: SqlitePool, public_url: impl Into<String>) -> Self {
        Self {
            store: RecordStore::new(db, "metadata_records", "record", "aspect-path"),
            public_url: public_url.into(),
        }
    }

    fn new_record(p: &AddPayload) -> NewRecord<'_> {
        NewRecord {
            entity: &p.entity_id,
            schema: &p.schema,
            content: &p.aspect,
            content_type: CONTENT_TYPE,
            policy: p.policy_id.as_deref(),
        }
    }
}

fn order_column(order_by: Option<&str>) -> ServiceResult<&'static str> {
    match order_by.unwrap_or("valid_from") {
        "valid_from" => Ok("valid_from"),
        "entity" => Ok("entity"),
        "schema" => Ok("schema"),
        other => Err(ServiceError::invalid_parameter(
            "order-by",
            Some(other),
            "must be one of valid_from, entity, schema",
        )),
    }
}

#[async_trait]
impl MetadataService for SqliteMetadataService {
    async fn add(&self, who: &Principal, p: AddPayload) -> ServiceResult<AddMetaRT> {
        let record_id = self.store.insert(Self::new_record(&p), &who.subject).await?;
        Ok(AddMetaRT { record_id })
    }

    async fn update_one(&self, who: &Principal, p: AddPayload) -> ServiceResult<AddMetaRT> {
        let record_id = self
            .store
            .replace_active(Self::new_record(&p), &who.subject, Some(1))
            .await?;
        Ok(AddMetaRT { record_id })
    }

    async fn update_record(
        &self,
        who: &Principal,
        p: UpdateRecordPayload,
    ) -> ServiceResult<AddMetaRT> {
        let current = self.store.get(&p.id).await?;
        let entity = p.entity_id.unwrap_or(current.entity);
        let schema = p.schema.unwrap_or(current.schema);
        let policy = p.policy_id.or(current.policy);
        let record_id = self
            .store
            .replace_record(
                &p.id,
                NewRecord {
                    entity: &entity,
                    schema: &schema,
                    content: &p.aspect,
                    content_type: CONTENT_TYPE,
                    policy: policy.as_deref(),
                },
                &who.subject,
            )
            .await?;
        tracing::info!(replaced = %p.id, record = %record_id, "metadata record replaced");
        Ok(AddMetaRT { record_id })
    }

    async fn revoke(&self, who: &Principal, id: &str) -> ServiceResult<()> {
        self.store.retract(id, &who.subject).await
    }

    async fn read(&self, _who: &Principal, id: &str) -> ServiceResult<MetadataRecordRT> {
        let row = self.store.get(id).await?;
        let aspect = row.content_json()?;
        Ok(MetadataRecordRT {
            record_id: row.id,
            entity: row.entity,
            schema: row.schema,
            aspect,
            valid_from: format_time(&row.valid_from),
            valid_to: row.valid_to.as_ref().map(format_time),
            asserter: row.asserter,
            revoker: row.retracter,
        })
    }

    async fn list(&self, _who: &Principal, p: MetadataListPayload) -> ServiceResult<ListMetaRT> {
        reject_filter(p.filter.as_deref())?;
        let paging = Paging::resolve(p.limit, p.page.as_deref())?;
        let at_time = resolve_at_time(p.at_time.as_deref())?;
        let segments = p
            .aspect_path
            .as_deref()
            .map(|path| parse_json_path("aspect-path", path))
            .transpose()?;

        let query = RecordQuery {
            entity: p.entity_id.as_deref(),
            schema: p.schema.as_deref(),
            json_path: p.aspect_path.as_deref(),
            at_time,
            order_by: order_column(p.order_by.as_deref())?,
            desc: p.order_desc.unwrap_or(true),
            paging,
        };
        let (rows, has_more) = self.store.list(&query).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let aspect = row.content_json()?;
            let aspect_context = segments
                .as_ref()
                .and_then(|segs| lookup(&aspect, segs).cloned());
            records.push(MetadataListItemRT {
                record_id: row.id,
                entity: row.entity,
                schema: row.schema,
                aspect: Some(aspect),
                aspect_context,
            });
        }

        let mut qs = Vec::new();
        push_query(&mut qs, "entity-id", p.entity_id.as_deref());
        push_query(&mut qs, "schema", p.schema.as_deref());
        push_query(&mut qs, "aspect-path", p.aspect_path.as_deref());
        push_query(&mut qs, "at-time", p.at_time.as_deref());
        push_query(&mut qs, "order-by", p.order_by.as_deref());
        push_query(
            &mut qs,
            "order-desc",
            p.order_desc.map(|d| if d { "true" } else { "false" }),
        );

        Ok(ListMetaRT {
            records,
            entity_id: p.entity_id,
            schema: p.schema,
            aspect_path: p.aspect_path,
            at_time: format_time(&at_time),
            links: page_links(
                &format!("{}/1/metadata", self.public_url),
                &qs.join("&"),
                &paging,
                has_more,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::test_pool, services::test_principal};
    use serde_json::json;

    fn add(aspect: serde_json::Value) -> AddPayload {
        AddPayload {
            entity_id: "urn:ivcap:service:7".into(),
            schema: "urn:example:schema:rating.1".into(),
            policy_id: None,
            aspect,
        }
    }

    #[tokio::test]
    async fn update_one_replaces_single_active_record() {
        let svc = SqliteMetadataService::new(test_pool().await, "http://h");
        let who = test_principal();
        let first = svc.add(&who, add(json!({"stars": 3}))).await.unwrap();
        let second = svc.update_one(&who, add(json!({"stars": 4}))).await.unwrap();
        let old = svc.read(&who, &first.record_id).await.unwrap();
        assert_eq!(old.revoker.as_deref(), Some("alice"));
        assert!(svc.read(&who, &second.record_id).await.unwrap().valid_to.is_none());
    }

    #[tokio::test]
    async fn update_one_refuses_when_ambiguous() {
        let svc = SqliteMetadataService::new(test_pool().await, "http://h");
        let who = test_principal();
        svc.add(&who, add(json!({"stars": 1}))).await.unwrap();
        svc.add(&who, add(json!({"stars": 2}))).await.unwrap();
        assert!(matches!(
            svc.update_one(&who, add(json!({"stars": 5}))).await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn update_record_keeps_entity_and_schema() {
        let svc = SqliteMetadataService::new(test_pool().await, "http://h");
        let who = test_principal();
        let first = svc.add(&who, add(json!({"stars": 3}))).await.unwrap();
        let next = svc
            .update_record(
                &who,
                UpdateRecordPayload {
                    id: first.record_id.clone(),
                    entity_id: None,
                    schema: None,
                    policy_id: None,
                    aspect: json!({"stars": 5}),
                },
            )
            .await
            .unwrap();
        let rec = svc.read(&who, &next.record_id).await.unwrap();
        assert_eq!(rec.entity, "urn:ivcap:service:7");
        assert_eq!(rec.aspect, json!({"stars": 5}));
    }

    #[tokio::test]
    async fn list_extracts_aspect_context() {
        let svc = SqliteMetadataService::new(test_pool().await, "http://h");
        let who = test_principal();
        svc.add(&who, add(json!({"review": {"stars": 4, "text": "ok"}})))
            .await
            .unwrap();
        svc.add(&who, add(json!({"other": true}))).await.unwrap();

        let listed = svc
            .list(
                &who,
                MetadataListPayload {
                    aspect_path: Some("$.review.stars".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.records.len(), 1);
        assert_eq!(listed.records[0].aspect_context, Some(json!(4)));
    }

    #[tokio::test]
    async fn revoke_unknown_record_is_not_found() {
        let svc = SqliteMetadataService::new(test_pool().await, "http://h");
        let err = svc
            .revoke(&test_principal(), "6a1c0b3e-1d7e-4a0b-9a1c-000000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
