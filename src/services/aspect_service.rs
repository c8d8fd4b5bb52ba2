use super::{
    AspectService,
    record_store::{NewRecord, RecordQuery, RecordRow, RecordStore},
};
use crate::{
    auth::Principal,
    errors::{ServiceError, ServiceResult},
    models::{
        aspect::{
            AspectIDRT, AspectListItemRT, AspectListPayload, AspectListRT, AspectRT, CreatePayload,
        },
        common::{
            LinkT, Paging, format_time, page_links, push_query, reject_filter, resolve_at_time,
        },
    },
};
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqliteAspectService {
    store: RecordStore,
    public_url: String,
}

impl SqliteAspectService {
    pub fn new(db: SqlitePool, public_url: impl Into<String>) -> Self {
        Self {
            store: RecordStore::new(db, "aspects", "aspect", "content-path"),
            public_url: public_url.into(),
        }
    }

    fn new_record(p: &CreatePayload) -> NewRecord<'_> {
        NewRecord {
            entity: &p.entity,
            schema: &p.schema,
            content: &p.content,
            content_type: &p.content_type,
            policy: p.policy.as_deref(),
        }
    }

    fn list_item(row: RecordRow, include_content: bool) -> ServiceResult<AspectListItemRT> {
        let content = if include_content {
            Some(row.content_json()?)
        } else {
            None
        };
        Ok(AspectListItemRT {
            id: row.id,
            entity: row.entity,
            schema: row.schema,
            content,
            content_type: row.content_type,
            valid_from: format_time(&row.valid_from),
            valid_to: row.valid_to.as_ref().map(format_time),
            asserter: row.asserter,
            retracter: row.retracter,
        })
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

fn order_desc(direction: Option<&str>) -> ServiceResult<bool> {
    match direction.map(str::to_ascii_uppercase).as_deref() {
        None | Some("DESC") => Ok(true),
        Some("ASC") => Ok(false),
        Some(_) => Err(ServiceError::invalid_parameter(
            "order-direction",
            direction,
            "must be ASC or DESC",
        )),
    }
}

#[async_trait]
impl AspectService for SqliteAspectService {
    async fn create(&self, who: &Principal, p: CreatePayload) -> ServiceResult<AspectIDRT> {
        let id = self.store.insert(Self::new_record(&p), &who.subject).await?;
        tracing::info!(aspect = %id, entity = %p.entity, schema = %p.schema, "aspect created");
        Ok(AspectIDRT { id })
    }

    async fn update(&self, who: &Principal, p: CreatePayload) -> ServiceResult<AspectIDRT> {
        let id = self
            .store
            .replace_active(Self::new_record(&p), &who.subject, None)
            .await?;
        tracing::info!(aspect = %id, entity = %p.entity, schema = %p.schema, "aspect updated");
        Ok(AspectIDRT { id })
    }

    async fn retract(&self, who: &Principal, id: &str) -> ServiceResult<()> {
        self.store.retract(id, &who.subject).await
    }

    async fn read(&self, _who: &Principal, id: &str) -> ServiceResult<AspectRT> {
        let row = self.store.get(id).await?;
        let content = row.content_json()?;
        let href = format!("{}/1/aspects/{}", self.public_url, row.id);
        Ok(AspectRT {
            id: row.id,
            entity: row.entity,
            schema: row.schema,
            content,
            content_type: row.content_type,
            valid_from: format_time(&row.valid_from),
            valid_to: row.valid_to.as_ref().map(format_time),
            asserter: row.asserter,
            retracter: row.retracter,
            links: vec![LinkT::new("self", "application/json", href)],
        })
    }

    async fn list(&self, _who: &Principal, p: AspectListPayload) -> ServiceResult<AspectListRT> {
        reject_filter(p.filter.as_deref())?;
        let paging = Paging::resolve(p.limit, p.page.as_deref())?;
        let at_time = resolve_at_time(p.at_time.as_deref())?;
        let query = RecordQuery {
            entity: p.entity.as_deref(),
            schema: p.schema.as_deref(),
            json_path: p.content_path.as_deref(),
            at_time,
            order_by: order_column(p.order_by.as_deref())?,
            desc: order_desc(p.order_direction.as_deref())?,
            paging,
        };
        let (rows, has_more) = self.store.list(&query).await?;
        let include_content = p.include_content.unwrap_or(false);
        let items = rows
            .into_iter()
            .map(|row| Self::list_item(row, include_content))
            .collect::<ServiceResult<Vec<_>>>()?;

        let mut qs = Vec::new();
        push_query(&mut qs, "entity", p.entity.as_deref());
        push_query(&mut qs, "schema", p.schema.as_deref());
        push_query(&mut qs, "content-path", p.content_path.as_deref());
        push_query(&mut qs, "at-time", p.at_time.as_deref());
        push_query(&mut qs, "order-by", p.order_by.as_deref());
        push_query(&mut qs, "order-direction", p.order_direction.as_deref());
        push_query(
            &mut qs,
            "include-content",
            p.include_content.map(|b| if b { "true" } else { "false" }),
        );

        Ok(AspectListRT {
            items,
            entity: p.entity,
            schema: p.schema,
            content_path: p.content_path,
            at_time: format_time(&at_time),
            links: page_links(
                &format!("{}/1/aspects", self.public_url),
                &qs.join("&"),
                &paging,
                has_more,
            ),
        })
    }
}
