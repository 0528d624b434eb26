//! Request handlers for sync endpoints.
//!
//! Handlers are synchronous and transport independent: they take protocol
//! messages plus the caller's credentials and return protocol messages. The
//! HTTP layer runs them on the blocking pool.

use crate::auth::{ApiKeyValidator, ShareCredential, ShareTokenService};
use crate::config::ServerConfig;
use crate::error::ServerResult;
use drivesync_core::{
    Change, ChildSummary, ChunkOutcome, DeleteOutcome, Drive, InitUpload, NormalizedPath,
    ResolvedFile,
};
use drivesync_sync_protocol::{
    ChangeRecord, ChangesQuery, ChangesResponse, ChunkQuery, ChunkResponse, Crc32, DeleteRequest,
    DeleteResponse, FinalizeRequest, FinalizeResponse, InitRequest, InitResponse, ListChild,
    ListResponse, PathQuery, UnlockRequest, UnlockResponse,
};
use std::sync::Arc;

/// Credentials presented with a request.
#[derive(Debug, Clone, Default)]
pub struct RequestAuth {
    /// Bearer key from `Authorization`.
    pub bearer: Option<String>,
    /// Share credential from the share cookie or `X-Share-Credential`.
    pub share_credential: Option<String>,
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The drive being served.
    pub drive: Arc<Drive>,
    /// Share rows and credentials.
    pub shares: ShareTokenService,
    api_key: Option<ApiKeyValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    ///
    /// # Errors
    ///
    /// Fails if the share secret or API key is empty.
    pub fn new(config: ServerConfig, drive: Arc<Drive>) -> ServerResult<Self> {
        let shares = ShareTokenService::new(&config.share_secret, config.share_ttl, drive.meta())?;
        let api_key = config
            .sync_api_key
            .as_deref()
            .map(ApiKeyValidator::new)
            .transpose()?;
        Ok(Self {
            config,
            drive,
            shares,
            api_key,
        })
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the handler context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Checks the sync capability.
    ///
    /// Passes trivially when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AuthenticationFailed`](crate::ServerError::AuthenticationFailed) for a missing or wrong key.
    pub fn check_sync(&self, auth: &RequestAuth) -> ServerResult<()> {
        match &self.context.api_key {
            Some(validator) => validator.validate(auth.bearer.as_deref()),
            None => Ok(()),
        }
    }

    /// Handles `GET changes`.
    pub fn handle_changes(
        &self,
        auth: &RequestAuth,
        query: ChangesQuery,
    ) -> ServerResult<ChangesResponse> {
        self.check_sync(auth)?;
        let page = self
            .context
            .drive
            .changes_since(query.since.unwrap_or(0), query.limit)?;
        Ok(ChangesResponse {
            changes: page.changes.into_iter().map(change_record).collect(),
            next_since: page.next_cursor,
        })
    }

    /// Handles `POST upload/init`.
    pub fn handle_init(&self, auth: &RequestAuth, req: InitRequest) -> ServerResult<InitResponse> {
        self.check_sync(auth)?;
        let outcome = self.context.drive.init_upload(InitUpload {
            rel_path: req.rel_path,
            size: req.size,
            mtime: req.mtime,
            content_hash: req.crc32.map(Crc32::get),
            base_rev: req.base_rev,
            device_id: req.device_id,
            device_label: req.device_label,
        })?;
        Ok(InitResponse {
            upload_id: outcome.upload_id,
            decided_path: outcome.decided_path.into_string(),
            suggested_chunk_size_mb: outcome.suggested_chunk_size_mb,
        })
    }

    /// Handles `POST upload/chunk`.
    pub fn handle_chunk(
        &self,
        auth: &RequestAuth,
        query: &ChunkQuery,
        data: &[u8],
    ) -> ServerResult<ChunkResponse> {
        self.check_sync(auth)?;
        let outcome = self
            .context
            .drive
            .upload_chunk(&query.upload_id, query.offset, data)?;
        Ok(match outcome {
            ChunkOutcome::Accepted { received_bytes } => ChunkResponse::accepted(received_bytes),
            ChunkOutcome::Duplicate { received_bytes } => ChunkResponse::duplicate(received_bytes),
        })
    }

    /// Handles `POST upload/finalize`.
    pub fn handle_finalize(
        &self,
        auth: &RequestAuth,
        req: &FinalizeRequest,
    ) -> ServerResult<FinalizeResponse> {
        self.check_sync(auth)?;
        let done = self.context.drive.finalize_upload(&req.upload_id)?;
        Ok(FinalizeResponse {
            ok: true,
            crc32: Crc32(done.entry.content_hash.unwrap_or_default()),
            rel_path: done.entry.rel_path,
            rev: done.entry.rev,
            change_id: done.change_id,
        })
    }

    /// Handles `POST delete`.
    pub fn handle_delete(
        &self,
        auth: &RequestAuth,
        req: DeleteRequest,
    ) -> ServerResult<DeleteResponse> {
        self.check_sync(auth)?;
        let outcome = self.context.drive.delete(&req.rel_path, req.device_id)?;
        Ok(delete_response(outcome))
    }

    /// Handles `GET list`.
    ///
    /// With a share token the listing is confined to the share: an empty
    /// path lists the scope, and a file scope lists just that file.
    pub fn handle_list(&self, auth: &RequestAuth, query: &PathQuery) -> ServerResult<ListResponse> {
        let requested = NormalizedPath::parse_dir(&query.path)?;
        let drive = &self.context.drive;

        let dir = match share_token(query) {
            Some(token) => {
                let (share, scope) = self.context.shares.authorize(
                    token,
                    auth.share_credential.as_deref(),
                    requested.as_ref(),
                )?;
                let dir = requested.unwrap_or(scope);
                if !share.scope_is_dir {
                    let children = drive
                        .entries()
                        .get_live(&dir)?
                        .map(|entry| ChildSummary {
                            name: dir.file_name().to_string(),
                            rel_path: entry.rel_path,
                            is_dir: false,
                            rev: entry.rev,
                            size: Some(entry.size),
                            mtime: Some(entry.mtime),
                            content_hash: entry.content_hash,
                        })
                        .into_iter()
                        .map(list_child)
                        .collect();
                    return Ok(ListResponse {
                        path: dir.into_string(),
                        children,
                    });
                }
                Some(dir)
            }
            None => {
                self.check_sync(auth)?;
                requested
            }
        };

        let children = drive.list(dir.as_ref())?;
        Ok(ListResponse {
            path: dir.map(NormalizedPath::into_string).unwrap_or_default(),
            children: children.into_iter().map(list_child).collect(),
        })
    }

    /// Authorizes a download and resolves the file to send.
    pub fn resolve_download(
        &self,
        auth: &RequestAuth,
        query: &PathQuery,
    ) -> ServerResult<ResolvedFile> {
        let path = NormalizedPath::parse(&query.path)?;
        match share_token(query) {
            Some(token) => {
                self.context.shares.authorize(
                    token,
                    auth.share_credential.as_deref(),
                    Some(&path),
                )?;
            }
            None => self.check_sync(auth)?,
        }
        Ok(self.context.drive.resolve_file(&path)?)
    }

    /// Handles `POST share/unlock`.
    ///
    /// Returns the response and the sanitized token the credential belongs to.
    pub fn handle_unlock(&self, req: &UnlockRequest) -> ServerResult<(UnlockResponse, String)> {
        let (share, ShareCredential { value, expires_at }) =
            self.context.shares.unlock(&req.token, &req.password)?;
        Ok((
            UnlockResponse {
                ok: true,
                credential: value,
                expires_at,
            },
            share.token,
        ))
    }
}

fn share_token(query: &PathQuery) -> Option<&str> {
    query.token.as_deref().filter(|t| !t.trim().is_empty())
}

fn change_record(change: Change) -> ChangeRecord {
    ChangeRecord {
        change_id: change.change_id,
        rel_path: change.rel_path,
        action: change.action.as_str().to_string(),
        is_dir: change.is_dir,
        rev: change.rev,
        size: change.size,
        mtime: change.mtime,
        crc32: change.content_hash.map(Crc32),
        deleted_size: change.deleted_size,
        deleted_crc32: change.deleted_hash.map(Crc32),
        device_id: change.device_id,
        created_at: change.created_at,
    }
}

fn list_child(child: ChildSummary) -> ListChild {
    ListChild {
        name: child.name,
        rel_path: child.rel_path,
        is_dir: child.is_dir,
        rev: child.rev,
        size: child.size,
        mtime: child.mtime,
        crc32: child.content_hash.map(Crc32),
    }
}

fn delete_response(outcome: DeleteOutcome) -> DeleteResponse {
    if outcome.already_deleted {
        DeleteResponse {
            ok: true,
            rel_path: None,
            rev: None,
            change_id: outcome.change_id,
            already_deleted: Some(true),
        }
    } else {
        DeleteResponse {
            ok: true,
            rel_path: Some(outcome.rel_path.into_string()),
            rev: Some(outcome.rev),
            change_id: outcome.change_id,
            already_deleted: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use drivesync_core::Config;

    fn handler(dir: &std::path::Path, key: Option<&str>) -> RequestHandler {
        let mut config = ServerConfig::new(dir, b"secret".to_vec());
        if let Some(key) = key {
            config = config.with_sync_api_key(key);
        }
        let drive = Arc::new(Drive::open_ephemeral(dir, Config::default()).unwrap());
        RequestHandler::new(Arc::new(HandlerContext::new(config, drive).unwrap()))
    }

    fn upload(h: &RequestHandler, path: &str, data: &[u8]) -> FinalizeResponse {
        let auth = RequestAuth::default();
        let init = h
            .handle_init(
                &auth,
                InitRequest {
                    rel_path: path.into(),
                    size: data.len() as i64,
                    mtime: 1,
                    crc32: None,
                    base_rev: 0,
                    device_id: Some("dev".into()),
                    device_label: None,
                },
            )
            .unwrap();
        if !data.is_empty() {
            h.handle_chunk(
                &auth,
                &ChunkQuery {
                    upload_id: init.upload_id.clone(),
                    offset: 0,
                },
                data,
            )
            .unwrap();
        }
        h.handle_finalize(
            &auth,
            &FinalizeRequest {
                upload_id: init.upload_id,
            },
        )
        .unwrap()
    }

    #[test]
    fn upload_then_changes() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), None);
        let done = upload(&h, "a/b.txt", b"hello");
        assert_eq!(done.rev, 1);
        assert_eq!(done.crc32, Crc32(0x3610_a686));

        let page = h
            .handle_changes(&RequestAuth::default(), ChangesQuery::default())
            .unwrap();
        assert_eq!(page.next_since, 1);
        assert_eq!(page.changes[0].action, "upsert");
        assert_eq!(page.changes[0].crc32, Some(Crc32(0x3610_a686)));
        assert_eq!(page.changes[0].device_id.as_deref(), Some("dev"));
    }

    #[test]
    fn sync_key_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), Some("k1"));
        let err = h
            .handle_changes(&RequestAuth::default(), ChangesQuery::default())
            .unwrap_err();
        assert!(matches!(err, ServerError::AuthenticationFailed(_)));

        let auth = RequestAuth {
            bearer: Some("k1".into()),
            share_credential: None,
        };
        assert!(h.handle_changes(&auth, ChangesQuery::default()).is_ok());
    }

    #[test]
    fn delete_response_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), None);
        upload(&h, "x.txt", b"x");

        let req = || DeleteRequest {
            rel_path: "x.txt".into(),
            device_id: None,
        };
        let first = h.handle_delete(&RequestAuth::default(), req()).unwrap();
        assert_eq!(first.rel_path.as_deref(), Some("x.txt"));
        assert_eq!(first.rev, Some(2));
        assert_eq!(first.already_deleted, None);

        let second = h.handle_delete(&RequestAuth::default(), req()).unwrap();
        assert_eq!(second.already_deleted, Some(true));
        assert!(second.change_id > first.change_id);
    }

    #[test]
    fn share_listing_is_confined() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), Some("k1"));
        let sync = RequestAuth {
            bearer: Some("k1".into()),
            share_credential: None,
        };
        for (path, data) in [("docs/a.txt", b"a"), ("docs/sub/b.txt", b"b"), ("secret.txt", b"s")] {
            let init = h
                .handle_init(
                    &sync,
                    InitRequest {
                        rel_path: path.into(),
                        size: 1,
                        mtime: 0,
                        crc32: None,
                        base_rev: 0,
                        device_id: None,
                        device_label: None,
                    },
                )
                .unwrap();
            h.handle_chunk(
                &sync,
                &ChunkQuery {
                    upload_id: init.upload_id.clone(),
                    offset: 0,
                },
                data,
            )
            .unwrap();
            h.handle_finalize(
                &sync,
                &FinalizeRequest {
                    upload_id: init.upload_id,
                },
            )
            .unwrap();
        }

        let share = h
            .context()
            .shares
            .create_share("docs", true, "pw", None)
            .unwrap();
        let (unlocked, token) = h
            .handle_unlock(&UnlockRequest {
                token: share.token.clone(),
                password: "pw".into(),
            })
            .unwrap();
        assert_eq!(token, share.token);

        let anon = RequestAuth {
            bearer: None,
            share_credential: Some(unlocked.credential),
        };
        let query = |path: &str| PathQuery {
            path: path.into(),
            token: Some(share.token.clone()),
        };

        let listing = h.handle_list(&anon, &query("")).unwrap();
        assert_eq!(listing.path, "docs");
        let names: Vec<_> = listing.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["sub", "a.txt"]);

        assert!(matches!(
            h.handle_list(&anon, &query("secret.txt")),
            Err(ServerError::NotAuthorized(_))
        ));
        assert!(h.resolve_download(&anon, &query("docs/sub/b.txt")).is_ok());
        assert!(matches!(
            h.resolve_download(&anon, &query("secret.txt")),
            Err(ServerError::NotAuthorized(_))
        ));

        // Without a credential the share stays locked.
        assert!(matches!(
            h.handle_list(&RequestAuth::default(), &query("")),
            Err(ServerError::NotAuthorized(_))
        ));
    }

    #[test]
    fn file_share_lists_only_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path(), None);
        upload(&h, "docs/a.txt", b"abc");
        upload(&h, "docs/b.txt", b"def");

        let share = h
            .context()
            .shares
            .create_share("docs/a.txt", false, "pw", None)
            .unwrap();
        let credential = h.context().shares.issue(&share.token).value;
        let anon = RequestAuth {
            bearer: None,
            share_credential: Some(credential),
        };
        let listing = h
            .handle_list(
                &anon,
                &PathQuery {
                    path: String::new(),
                    token: Some(share.token),
                },
            )
            .unwrap();
        assert_eq!(listing.children.len(), 1);
        assert_eq!(listing.children[0].rel_path, "docs/a.txt");
        assert_eq!(listing.children[0].size, Some(3));
    }
}
