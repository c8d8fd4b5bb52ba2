use super::ServiceRegistry;
use crate::{
    auth::Principal,
    db::timestamp,
    errors::{ServiceError, ServiceResult},
    models::{
        common::{
            LinkT, ListPayload, Paging, format_time, page_links, push_query, reject_filter,
            resolve_at_time, validate_uuid,
        },
        service::{
            STATUS_ACTIVE, ServiceDescriptionT, ServiceListItem, ServiceListRT, ServiceStatusRT,
        },
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use uuid::Uuid;

const SERVICE_COLUMNS: &str = "id, name, description, banner, status, tags, parameters, refs, \
     workflow, policy, account, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct ServiceRow {
    id: String,
    name: String,
    description: String,
    banner: Option<String>,
    status: String,
    tags: String,
    parameters: String,
    refs: String,
    workflow: String,
    policy: Option<String>,
    account: Option<String>,
    created_at: DateTime<Utc>,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

pub struct SqliteServiceRegistry {
    db: SqlitePool,
    public_url: String,
}

impl SqliteServiceRegistry {
    pub fn new(db: SqlitePool, public_url: impl Into<String>) -> Self {
        Self {
            db,
            public_url: public_url.into(),
        }
    }

    fn href(&self, id: &str) -> String {
        format!("{}/1/services/{}", self.public_url, id)
    }

    fn to_status(&self, row: ServiceRow) -> ServiceResult<ServiceStatusRT> {
        let href = self.href(&row.id);
        Ok(ServiceStatusRT {
            name: Some(row.name),
            description: Some(row.description),
            banner: row.banner,
            status: row.status,
            tags: serde_json::from_str(&row.tags)?,
            parameters: serde_json::from_str(&row.parameters)?,
            references: serde_json::from_str(&row.refs)?,
            workflow: Some(serde_json::from_str(&row.workflow)?),
            policy: row.policy,
            account: row.account,
            published_at: Some(format_time(&row.created_at)),
            links: vec![LinkT::new("self", "application/json", href)],
            id: row.id,
        })
    }

    async fn fetch(&self, id: &str) -> ServiceResult<Option<ServiceRow>> {
        validate_uuid("id", id)
            .map_err(|_| ServiceError::bad_request(format!("`{}` is not a valid service id", id)))?;
        Ok(sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {} FROM services WHERE id = ?",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?)
    }

    /// Id of another service already using `name`.
    async fn name_owner(
        &self,
        name: &str,
        except: Option<&str>,
    ) -> ServiceResult<Option<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT id FROM services WHERE name = ? AND id != ?",
        )
        .bind(name)
        .bind(except.unwrap_or(""))
        .fetch_optional(&self.db)
        .await?)
    }

    /// Error for a write that tripped the unique index on `name`, which happens
    /// when another writer takes the name after [`Self::name_owner`] ran.
    async fn name_clash(
        &self,
        err: sqlx::Error,
        desc: &ServiceDescriptionT,
        on: NameClash,
    ) -> ServiceError {
        let taken = matches!(
            &err,
            sqlx::Error::Database(db) if db.is_unique_violation() && db.message().contains(".name")
        );
        if !taken {
            return err.into();
        }
        match on {
            NameClash::Create => match self.name_owner(&desc.name, None).await {
                Ok(Some(existing)) => ServiceError::already_created(
                    existing,
                    format!("a service named `{}` already exists", desc.name),
                ),
                Ok(None) => err.into(),
                Err(lookup) => lookup,
            },
            NameClash::Update => ServiceError::invalid_parameter(
                "name",
                Some(&desc.name),
                "already used by another service",
            ),
        }
    }

    async fn insert(
        &self,
        id: &str,
        who: &Principal,
        desc: &ServiceDescriptionT,
        on: NameClash,
    ) -> ServiceResult<ServiceStatusRT> {
        let now = timestamp(&Utc::now());
        let inserted = sqlx::query(&format!(
            "INSERT INTO services ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .bind(&desc.name)
        .bind(&desc.description)
        .bind(&desc.banner)
        .bind(STATUS_ACTIVE)
        .bind(serde_json::to_string(&desc.tags)?)
        .bind(serde_json::to_string(&desc.parameters)?)
        .bind(serde_json::to_string(&desc.references)?)
        .bind(serde_json::to_string(&desc.workflow)?)
        .bind(&desc.policy_id)
        .bind(&who.subject)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await;
        if let Err(err) = inserted {
            return Err(self.name_clash(err, desc, on).await);
        }
        tracing::info!(service = %id, name = %desc.name, "service registered");
        self.read(who, id).await
    }

    async fn rewrite(&self, id: &str, desc: &ServiceDescriptionT) -> ServiceResult<()> {
        let updated = sqlx::query(
            "UPDATE services SET name = ?, description = ?, banner = ?, tags = ?, parameters = ?,
                 refs = ?, workflow = ?, policy = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&desc.name)
        .bind(&desc.description)
        .bind(&desc.banner)
        .bind(serde_json::to_string(&desc.tags)?)
        .bind(serde_json::to_string(&desc.parameters)?)
        .bind(serde_json::to_string(&desc.references)?)
        .bind(serde_json::to_string(&desc.workflow)?)
        .bind(&desc.policy_id)
        .bind(timestamp(&Utc::now()))
        .bind(id)
        .execute(&self.db)
        .await;
        match updated {
            Ok(_) => Ok(()),
            Err(err) => Err(self.name_clash(err, desc, NameClash::Update).await),
        }
    }
}

/// Which operation hit a taken name.
#[derive(Debug, Clone, Copy)]
enum NameClash {
    Create,
    Update,
}

fn order_column(order_by: Option<&str>) -> ServiceResult<&'static str> {
    match order_by.unwrap_or("created_at") {
        "created_at" => Ok("created_at"),
        "name" => Ok("name"),
        other => Err(ServiceError::invalid_parameter(
            "order-by",
            Some(other),
            "must be one of created_at, name",
        )),
    }
}

#[async_trait]
impl ServiceRegistry for SqliteServiceRegistry {
    async fn list(&self, _who: &Principal, p: ListPayload) -> ServiceResult<ServiceListRT> {
        reject_filter(p.filter.as_deref())?;
        let paging = Paging::resolve(p.limit, p.page.as_deref())?;
        let at_time = resolve_at_time(p.at_time.as_deref())?;
        let column = order_column(p.order_by.as_deref())?;
        let desc = p.order_desc.unwrap_or(true);

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM services WHERE created_at <= ",
            SERVICE_COLUMNS
        ));
        builder.push_bind(timestamp(&at_time));
        builder.push(format!(
            " ORDER BY {} {}, id ASC LIMIT ",
            column,
            if desc { "DESC" } else { "ASC" }
        ));
        builder.push_bind(paging.limit + 1);
        builder.push(" OFFSET ");
        builder.push_bind(paging.offset);

        let mut rows: Vec<ServiceRow> = builder.build_query_as().fetch_all(&self.db).await?;
        let has_more = rows.len() as i64 > paging.limit;
        rows.truncate(paging.limit as usize);

        let mut qs = Vec::new();
        push_query(&mut qs, "order-by", p.order_by.as_deref());
        let order_desc = p.order_desc.map(|d| if d { "true" } else { "false" });
        push_query(&mut qs, "order-desc", order_desc);
        push_query(&mut qs, "at-time", p.at_time.as_deref());

        Ok(ServiceListRT {
            services: rows
                .into_iter()
                .map(|row| ServiceListItem {
                    href: self.href(&row.id),
                    published_at: Some(format_time(&row.created_at)),
                    id: row.id,
                    name: Some(row.name),
                    description: Some(row.description),
                    banner: row.banner,
                })
                .collect(),
            at_time: format_time(&at_time),
            links: page_links(
                &format!("{}/1/services", self.public_url),
                &qs.join("&"),
                &paging,
                has_more,
            ),
        })
    }

    async fn create_service(
        &self,
        who: &Principal,
        desc: ServiceDescriptionT,
    ) -> ServiceResult<ServiceStatusRT> {
        desc.validate()?;
        if let Some(existing) = self.name_owner(&desc.name, None).await? {
            return Err(ServiceError::already_created(
                existing,
                format!("a service named `{}` already exists", desc.name),
            ));
        }
        let id = Uuid::new_v4().to_string();
        self.insert(&id, who, &desc, NameClash::Create).await
    }

    async fn read(&self, _who: &Principal, id: &str) -> ServiceResult<ServiceStatusRT> {
        let row = self
            .fetch(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(id, format!("service `{}` not found", id)))?;
        self.to_status(row)
    }

    async fn update(
        &self,
        who: &Principal,
        id: &str,
        force_create: bool,
        desc: ServiceDescriptionT,
    ) -> ServiceResult<ServiceStatusRT> {
        desc.validate()?;
        if self.name_owner(&desc.name, Some(id)).await?.is_some() {
            return Err(ServiceError::invalid_parameter(
                "name",
                Some(&desc.name),
                "already used by another service",
            ));
        }

        if self.fetch(id).await?.is_none() {
            if force_create {
                return self.insert(id, who, &desc, NameClash::Update).await;
            }
            return Err(ServiceError::not_found(id, format!("service `{}` not found", id)));
        }

        self.rewrite(id, &desc).await?;
        tracing::info!(service = %id, "service updated");
        self.read(who, id).await
    }

    async fn delete(&self, _who: &Principal, id: &str) -> ServiceResult<()> {
        validate_uuid("id", id)
            .map_err(|_| ServiceError::bad_request(format!("`{}` is not a valid service id", id)))?;
        let result = sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(id, format!("service `{}` not found", id)));
        }
        tracing::info!(service = %id, "service deleted");
        Ok(())
    }
}
