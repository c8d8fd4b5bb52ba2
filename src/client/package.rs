use super::{ApiClient, ClientError, ClientResult, Query, decode_json, header_i64, response_stream};
use crate::{
    errors::ErrorName::{self, *},
    models::package::{
        ListResult, PackageListPayload, PullPayload, PullRange, PushOutcome, PushPayload,
        PushStatusT,
    },
    services::ByteStream,
};
use reqwest::{Body, Method, StatusCode};

const LIST_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotImplemented,
    NotAvailable,
    Unauthorized,
];
const PULL_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotFound,
    NotAvailable,
    Unauthorized,
];
const PUSH_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    AlreadyCreated,
    NotAvailable,
    Unauthorized,
];
const STATUS_ERRORS: &[ErrorName] = &[
    BadRequest,
    InvalidParameter,
    InvalidScopes,
    NotAvailable,
    Unauthorized,
];
const REMOVE_ERRORS: &[ErrorName] =
    &[BadRequest, InvalidScopes, NotFound, NotAvailable, Unauthorized];

impl ApiClient {
    pub async fn list_packages(&self, p: &PackageListPayload) -> ClientResult<ListResult> {
        let query = Query::default()
            .opt("tag", p.tag.as_deref())
            .opt("limit", p.limit)
            .opt("page", p.page.as_deref());
        let req = self.request(Method::GET, "/1/pkgs").query(&query.0);
        self.send_json(req, StatusCode::OK, LIST_ERRORS).await
    }

    /// Stream a manifest or blob from `offset`.
    ///
    /// `Total` and `Available` come back as a [`PullRange`].
    pub async fn pull_package(&self, p: &PullPayload) -> ClientResult<(PullRange, ByteStream)> {
        let query = Query::default()
            .opt("ref", p.reference.as_deref())
            .set("type", p.type_)
            .opt("digest", p.digest.as_deref())
            .opt("offset", p.offset);
        let req = self.request(Method::GET, "/1/pkgs/pull").query(&query.0);
        let resp = self.send(req, &[StatusCode::OK], PULL_ERRORS).await?;
        let missing = |name: &str| ClientError::Decode(format!("missing `{}` header", name));
        let range = PullRange {
            total: header_i64(&resp, "Total")?.ok_or_else(|| missing("Total"))?,
            available: header_i64(&resp, "Available")?.ok_or_else(|| missing("Available"))?,
        };
        Ok((range, response_stream(resp)))
    }

    /// Push a manifest, or one `Start..End` range of a blob.
    ///
    /// `complete` is false when the server answered 202 and expects more ranges.
    pub async fn push_package(
        &self,
        p: &PushPayload,
        body: impl Into<Body>,
    ) -> ClientResult<PushOutcome> {
        let query = Query::default().set("tag", &p.tag).set("type", p.type_);
        let mut req = self.request(Method::POST, "/1/pkgs/push").query(&query.0);
        if let Some(digest) = &p.digest {
            req = req.header("Digest", digest);
        }
        if p.force {
            req = req.header("Force", "true");
        }
        if let Some(start) = p.start {
            req = req.header("Start", start.to_string());
        }
        if let Some(end) = p.end {
            req = req.header("End", end.to_string());
        }
        let resp = self
            .send(
                req.body(body),
                &[StatusCode::OK, StatusCode::ACCEPTED],
                PUSH_ERRORS,
            )
            .await?;
        let complete = resp.status() == StatusCode::OK;
        Ok(PushOutcome {
            result: decode_json(resp).await?,
            complete,
        })
    }

    pub async fn package_push_status(&self, tag: &str, digest: &str) -> ClientResult<PushStatusT> {
        let req = self
            .request(Method::GET, "/1/pkgs/push/status")
            .query(&[("tag", tag), ("digest", digest)]);
        self.send_json(req, StatusCode::OK, STATUS_ERRORS).await
    }

    pub async fn remove_package(&self, tag: &str) -> ClientResult<()> {
        let req = self.request(Method::DELETE, "/1/pkgs").query(&[("tag", tag)]);
        self.send_empty(req, StatusCode::NO_CONTENT, REMOVE_ERRORS).await
    }
}
