//! GitHub dialect: REST `/activity` + `/pulls` for candidate hashes, GraphQL
//! `history(first:10)` for commit metadata, GraphQL `entries{mode name oid
//! type}` for trees, REST blobs for content (§4.4, §4.6, §6).

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::debug;

use crate::errors::{RecoveryError, Result};
use crate::hash::ObjectId;
use crate::internal::object::signature::Person;
use crate::remote::{BlobClass, CommitRecord, RemoteClient, RemoteEntryKind, RemoteTreeEntry, with_retry};
use crate::utils::RemoteOrigin;

const GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";

pub struct GitHubClient {
    origin: RemoteOrigin,
    token: Option<String>,
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(origin: RemoteOrigin, token: Option<String>) -> Self {
        GitHubClient {
            origin,
            token,
            http: reqwest::Client::new(),
        }
    }

    fn rest_url(&self, path: &str) -> String {
        format!(
            "https://api.github.com/repos/{}/{}{path}",
            self.origin.owner, self.origin.repo
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("User-Agent", "dangling-recovery");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Follows GitHub's `Link: <url>; rel="next"` pagination header until exhausted.
    async fn rest_get_paginated(&self, path: &str) -> Result<Vec<Value>> {
        let mut url = self.rest_url(path);
        let mut out = Vec::new();

        loop {
            let response = self
                .authed(self.http.get(&url))
                .send()
                .await
                .map_err(|e| RecoveryError::Repository(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(RecoveryError::Repository(format!(
                    "github rest {status}: {body}"
                )));
            }

            let next = response
                .headers()
                .get("link")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_next_link);

            let page: Value = response
                .json()
                .await
                .map_err(|e| RecoveryError::Repository(e.to_string()))?;
            if let Value::Array(items) = page {
                out.extend(items);
            }

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        Ok(out)
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let body = serde_json::json!({ "query": query, "variables": variables });
        let response = self
            .authed(self.http.post(GRAPHQL_ENDPOINT))
            .json(&body)
            .send()
            .await
            .map_err(|e| RecoveryError::Repository(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RecoveryError::Repository(format!(
                "github graphql {status}: {text}"
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| RecoveryError::Repository(e.to_string()))?;

        if let Some(errors) = parsed.get("errors") {
            return Err(RecoveryError::Repository(format!(
                "github graphql errors: {errors}"
            )));
        }

        Ok(parsed)
    }

    /// Queries `/rate_limit` for the core resource's reset time, so
    /// `backoff_sleep` can sleep exactly as long as GitHub says to rather
    /// than falling back to its fixed 60s default (§4.3).
    async fn rate_limit_reset(&self) -> Option<i64> {
        let response = self
            .authed(self.http.get("https://api.github.com/rate_limit"))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: Value = response.json().await.ok()?;
        body.pointer("/resources/core/reset").and_then(Value::as_i64)
    }
}

fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let url = segments.next()?.trim().trim_start_matches('<').trim_end_matches('>');
        let is_next = segments.any(|s| s.trim() == "rel=\"next\"");
        is_next.then(|| url.to_string())
    })
}

#[async_trait]
impl RemoteClient for GitHubClient {
    async fn dangling_hashes(&self) -> Result<Vec<ObjectId>> {
        let mut shas = Vec::new();

        let activity = self.rest_get_paginated("/activity").await?;
        for event in &activity {
            for field in ["before", "after"] {
                if let Some(sha) = event.get(field).and_then(Value::as_str) {
                    push_sha(&mut shas, sha);
                }
            }
        }

        let pulls = self.rest_get_paginated("/pulls?state=all").await?;
        for pr in &pulls {
            if let Some(sha) = pr.pointer("/base/sha").and_then(Value::as_str) {
                push_sha(&mut shas, sha);
            }
            if let Some(sha) = pr.pointer("/head/sha").and_then(Value::as_str) {
                push_sha(&mut shas, sha);
            }
            if let Some(sha) = pr.get("merge_commit_sha").and_then(Value::as_str) {
                push_sha(&mut shas, sha);
            }
        }

        Ok(shas)
    }

    async fn fetch_commit_batch(&self, shas: &[ObjectId]) -> Result<Vec<Option<CommitRecord>>> {
        let mut out = Vec::with_capacity(shas.len());
        for sha in shas {
            let query = r#"
                query($oid: GitObjectID!, $owner: String!, $repo: String!) {
                  repository(owner: $owner, name: $repo) {
                    object(oid: $oid) {
                      ... on Commit {
                        oid
                        message
                        tree { oid }
                        parents(first: 10) { nodes { oid } }
                        author { name email date }
                        committer { name email date }
                        signature {
                          isValid
                          state
                          payload
                          signature
                        }
                        history(first: 10) { nodes { oid } }
                      }
                    }
                  }
                }
            "#;
            let variables = serde_json::json!({
                "oid": sha.to_string(),
                "owner": self.origin.owner,
                "repo": self.origin.repo,
            });

            let record = with_retry(
                || async {
                    let response = self.graphql(query, variables.clone()).await?;
                    Ok(response.pointer("/data/repository/object").cloned())
                },
                || self.rate_limit_reset(),
            )
            .await?;

            out.push(parse_commit_node(record.as_ref().and_then(|v| v.as_object().map(|_| v))));
        }
        Ok(out)
    }

    async fn fetch_tree_batch(&self, shas: &[ObjectId]) -> Result<Vec<Option<Vec<RemoteTreeEntry>>>> {
        let mut out = Vec::with_capacity(shas.len());
        for sha in shas {
            let query = r#"
                query($oid: GitObjectID!, $owner: String!, $repo: String!) {
                  repository(owner: $owner, name: $repo) {
                    object(oid: $oid) {
                      ... on Tree {
                        entries { mode name oid type }
                      }
                    }
                  }
                }
            "#;
            let variables = serde_json::json!({
                "oid": sha.to_string(),
                "owner": self.origin.owner,
                "repo": self.origin.repo,
            });

            let entries = with_retry(
                || async {
                    let response = self.graphql(query, variables.clone()).await?;
                    Ok(response.pointer("/data/repository/object/entries").cloned())
                },
                || self.rate_limit_reset(),
            )
            .await?;

            out.push(parse_tree_entries(entries)?);
        }
        Ok(out)
    }

    async fn classify_blobs(&self, shas: &[ObjectId]) -> Result<Vec<BlobClass>> {
        // GitHub's blob REST endpoint reports size and encoding up front.
        let mut out = Vec::with_capacity(shas.len());
        for sha in shas {
            let url = self.rest_url(&format!("/git/blobs/{sha}"));
            let response = self
                .authed(self.http.get(&url))
                .send()
                .await
                .map_err(|e| RecoveryError::Repository(e.to_string()))?;
            if !response.status().is_success() {
                out.push(BlobClass::TooLarge);
                continue;
            }
            let body: Value = response
                .json()
                .await
                .map_err(|e| RecoveryError::Repository(e.to_string()))?;
            let encoding = body.get("encoding").and_then(Value::as_str).unwrap_or("");
            debug!(%sha, encoding, "classified blob");
            out.push(if encoding == "base64" {
                BlobClass::Fetchable
            } else {
                BlobClass::Binary
            });
        }
        Ok(out)
    }

    async fn fetch_blob(&self, sha: &ObjectId) -> Result<Vec<u8>> {
        let url = self.rest_url(&format!("/git/blobs/{sha}"));
        let response = self
            .authed(self.http.get(&url))
            .send()
            .await
            .map_err(|e| RecoveryError::Repository(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RecoveryError::Repository(e.to_string()))?;
        let content = body
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| RecoveryError::Repository(format!("blob {sha} missing content")))?;
        let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        BASE64
            .decode(&cleaned)
            .map_err(|e| RecoveryError::Repository(format!("blob {sha} base64 decode failed: {e}")))
    }
}

fn push_sha(shas: &mut Vec<ObjectId>, raw: &str) {
    if raw.is_empty() || raw.chars().all(|c| c == '0') {
        return;
    }
    if let Ok(id) = raw.parse::<ObjectId>() {
        shas.push(id);
    }
}

fn parse_commit_node(node: Option<&Value>) -> Option<CommitRecord> {
    let node = node?;
    if node.is_null() {
        return None;
    }

    let tree: ObjectId = node.pointer("/tree/oid")?.as_str()?.parse().ok()?;
    let message = node.get("message")?.as_str()?.to_string();

    let parents = node
        .pointer("/parents/nodes")?
        .as_array()?
        .iter()
        .filter_map(|p| p.get("oid")?.as_str()?.parse::<ObjectId>().ok())
        .collect();

    let author = parse_person(node.get("author")?)?;
    let committer = parse_person(node.get("committer")?)?;

    let signature = node.get("signature");
    let (status, payload, block) = match signature {
        Some(sig) if !sig.is_null() => {
            let state = sig.get("state").and_then(Value::as_str).unwrap_or("unsigned");
            (
                state.to_ascii_lowercase(),
                sig.get("payload").and_then(Value::as_str).map(String::from),
                sig.get("signature").and_then(Value::as_str).map(String::from),
            )
        }
        _ => ("unsigned".to_string(), None, None),
    };

    Some(CommitRecord {
        tree,
        parents,
        author,
        committer,
        message,
        signature_status: status,
        signed_payload: payload,
        signature_block: block,
    })
}

fn parse_person(value: &Value) -> Option<Person> {
    Some(Person::new(
        value.get("name")?.as_str()?,
        value.get("email")?.as_str()?,
        value.get("date")?.as_str()?,
    ))
}

fn parse_tree_entries(entries: Option<Value>) -> Result<Option<Vec<RemoteTreeEntry>>> {
    let Some(entries) = entries else {
        return Ok(None);
    };
    let Some(array) = entries.as_array() else {
        return Ok(None);
    };

    let mut out = Vec::with_capacity(array.len());
    for entry in array {
        let mode = entry
            .get("mode")
            .and_then(Value::as_u64)
            .ok_or_else(|| RecoveryError::Repository("tree entry missing mode".to_string()))? as u32;
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RecoveryError::Repository("tree entry missing name".to_string()))?
            .to_string();
        let sha: ObjectId = entry
            .get("oid")
            .and_then(Value::as_str)
            .ok_or_else(|| RecoveryError::Repository("tree entry missing oid".to_string()))?
            .parse()
            .map_err(|_| RecoveryError::Repository("tree entry has malformed oid".to_string()))?;
        let kind = match entry.get("type").and_then(Value::as_str) {
            Some("tree") => RemoteEntryKind::Tree,
            Some("blob") => RemoteEntryKind::Blob,
            Some("commit") => RemoteEntryKind::Commit,
            other => {
                return Err(RecoveryError::Git(format!(
                    "unknown tree entry type from github: {other:?}"
                )));
            }
        };
        out.push(RemoteTreeEntry { mode, name, sha, kind });
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_extracts_url() {
        let header = r#"<https://api.github.com/x?page=2>; rel="next", <https://api.github.com/x?page=5>; rel="last""#;
        assert_eq!(
            parse_next_link(header),
            Some("https://api.github.com/x?page=2".to_string())
        );
    }

    #[test]
    fn no_next_link_returns_none() {
        let header = r#"<https://api.github.com/x?page=5>; rel="last""#;
        assert_eq!(parse_next_link(header), None);
    }

    #[test]
    fn push_sha_discards_zero_and_empty() {
        let mut shas = Vec::new();
        push_sha(&mut shas, "");
        push_sha(&mut shas, &"0".repeat(40));
        push_sha(&mut shas, &"a".repeat(40));
        assert_eq!(shas.len(), 1);
    }

    #[test]
    fn base64_roundtrips() {
        let decoded = BASE64.decode("aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
    }
}
