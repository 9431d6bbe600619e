use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::candidate::{CandidateStatus, ImportCandidate};
use crate::config::ImportConfig;
use crate::error::WikiError;
use crate::rewrite::{normalize_key, page_references, FileIndex, PageIndex, Rewriter};
use crate::storage::StorageClient;
use crate::task::{TaskError, TaskRegistry};
use crate::validator::{ValidationReport, Validator};
use crate::wiki::{PageId, PageStore, SearchIndexer, WikiIndex};

use super::context::ImportContext;
use super::error::ImportError;
use super::progress::{ImportPhase, ProgressEvent, ProgressReporter};
use super::request::{ImportOutcome, ImportRequest, PageImportResult};

/// External services an import talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn StorageClient>,
    pub pages: Arc<dyn PageStore>,
    pub wiki: Arc<dyn WikiIndex>,
    pub indexer: Arc<dyn SearchIndexer>,
}

/// Whether a step ran to its end or stopped at a cancellation point.
enum Flow {
    Continue,
    Cancelled,
}

/// What happened to a single page.
enum PageWrite {
    Created(PageId),
    Updated(PageId),
    Unmodified(PageId),
}

pub struct ImportOrchestrator {
    collaborators: Collaborators,
    registry: TaskRegistry,
    config: Arc<ImportConfig>,
}

impl ImportOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        registry: TaskRegistry,
        config: Arc<ImportConfig>,
    ) -> Self {
        Self {
            collaborators,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Validates the tree below `source_root_id` against the project's pages.
    pub async fn validate(
        &self,
        project_id: &str,
        source_root_id: &str,
    ) -> Result<ValidationReport, ImportError> {
        Validator::new(
            self.collaborators.storage.as_ref(),
            self.collaborators.wiki.as_ref(),
            &self.config.reserved_names,
        )
        .validate(project_id, source_root_id)
        .await
    }

    /// Registers a task for the request and runs it to the end.
    ///
    /// Fails with [`TaskError::AlreadyRunning`] when the project already has
    /// a running import.
    pub async fn run_import(
        &self,
        request: ImportRequest,
        task_id: &str,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<ImportOutcome, ImportError> {
        self.registry
            .register(&request.project.id, task_id, &request.actor)?;
        self.execute(request, task_id, cancel, progress).await
    }

    /// Runs an already registered task and records its terminal status.
    pub async fn execute(
        &self,
        request: ImportRequest,
        task_id: &str,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<ImportOutcome, ImportError> {
        let span = info_span!("import", project = %request.project.id, task_id = %task_id);
        let mut ctx = ImportContext::new(request, task_id);

        let result = self
            .run_steps(&mut ctx, cancel, progress)
            .instrument(span.clone())
            .await;

        span.in_scope(|| -> Result<ImportOutcome, ImportError> {
            let outcome = result?;
            self.finish_task(task_id, &outcome)?;
            Ok(outcome)
        })
        .map_err(|e| {
            span.in_scope(|| self.record_failure(task_id, &e, progress));
            e
        })
    }

    fn record_failure(&self, task_id: &str, error: &ImportError, progress: &dyn ProgressReporter) {
        let message = error.to_string();
        warn!(error = %message, "Import failed");
        progress.report(ProgressEvent::Phase {
            phase: ImportPhase::Failed,
            message: message.clone(),
        });
        if let Err(task_err) = self.registry.fail(task_id, &message) {
            warn!(error = %task_err, "Could not record import failure");
        }
    }

    fn finish_task(&self, task_id: &str, outcome: &ImportOutcome) -> Result<(), ImportError> {
        let recorded = if outcome.is_aborted() {
            self.registry.stop(task_id, outcome)
        } else {
            self.registry.complete(task_id, outcome)
        };

        match recorded {
            Ok(()) => Ok(()),
            // Another request marked this task stale while it ran.
            Err(e @ TaskError::InvalidTransition { .. }) => {
                warn!(error = %e, "Task already left the running state, keeping its status");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_steps(
        &self,
        ctx: &mut ImportContext,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<ImportOutcome, ImportError> {
        progress.report(ProgressEvent::Phase {
            phase: ImportPhase::Started,
            message: format!("Import of {} candidates started", ctx.request.candidates.len()),
        });

        // Step 1: Select importable candidates
        if cancel.is_cancelled() {
            return Ok(self.abort(ctx, progress));
        }
        progress.report(ProgressEvent::Phase {
            phase: ImportPhase::Validating,
            message: "Checking candidates...".to_string(),
        });
        self.step_validate(ctx)
            .instrument(info_span!("validate_candidates"))
            .await?;

        // Step 2: Fetch, clone and rewrite
        if cancel.is_cancelled() {
            return Ok(self.abort(ctx, progress));
        }
        progress.report(ProgressEvent::Phase {
            phase: ImportPhase::Preparing,
            message: "Fetching page content and preparing workspace...".to_string(),
        });
        if let Flow::Cancelled = self
            .step_prepare(ctx, cancel)
            .instrument(info_span!("prepare"))
            .await?
        {
            return Ok(self.abort(ctx, progress));
        }

        // Step 3: Write pages, shallowest first
        let batches = std::mem::take(&mut ctx.batches);
        for (depth, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(self.abort(ctx, progress));
            }
            progress.report(ProgressEvent::Batch {
                depth,
                pages: batch.len(),
            });
            if let Flow::Cancelled = self
                .step_import_batch(ctx, batch, cancel)
                .instrument(info_span!("import_batch", depth))
                .await
            {
                return Ok(self.abort(ctx, progress));
            }
        }

        // Step 4: Report and reindex
        if cancel.is_cancelled() {
            return Ok(self.abort(ctx, progress));
        }
        progress.report(ProgressEvent::Phase {
            phase: ImportPhase::Finalizing,
            message: "Finalizing import...".to_string(),
        });
        Ok(self.step_finalize(ctx, progress))
    }

    /// Re-validates the source tree and keeps the submitted candidates
    /// whose classification still holds and whose ancestors are all kept.
    async fn step_validate(&self, ctx: &mut ImportContext) -> Result<(), ImportError> {
        let fresh = self
            .validate(&ctx.request.project.id, &ctx.request.source_root_id)
            .await?;
        let current: HashMap<&str, &ImportCandidate> = fresh
            .importable()
            .map(|c| (c.source_file_id.as_str(), c))
            .collect();

        let mut importable: Vec<ImportCandidate> = Vec::new();
        for submitted in ctx.request.candidates.iter().filter(|c| c.status.is_importable()) {
            match current.get(submitted.source_file_id.as_str()) {
                Some(now) if still_valid(submitted, now) => importable.push(submitted.clone()),
                now => warn!(
                    path = %submitted.path,
                    submitted = %submitted.status,
                    now = now.map_or("missing", |c| c.status.as_str()),
                    "Dropping candidate whose validation changed since it was submitted"
                ),
            }
        }

        let reachable: HashSet<usize> = depth_batches(&importable).into_iter().flatten().collect();
        for (i, candidate) in importable.into_iter().enumerate() {
            if reachable.contains(&i) {
                ctx.importable.push(candidate);
            } else {
                warn!(
                    path = %candidate.path,
                    parent = candidate.parent_wiki_name.as_deref().unwrap_or_default(),
                    "Dropping candidate whose parent page is not part of the import"
                );
            }
        }

        ctx.batches = depth_batches(&ctx.importable);
        debug!(
            importable = ctx.importable.len(),
            depths = ctx.batches.len(),
            "Selected candidates"
        );
        Ok(())
    }

    async fn step_prepare(
        &self,
        ctx: &mut ImportContext,
        cancel: &CancellationToken,
    ) -> Result<Flow, ImportError> {
        let storage = self.collaborators.storage.as_ref();

        for candidate in ctx.importable.iter_mut() {
            let bytes = storage
                .get_content(&candidate.source_file_id)
                .await
                .map_err(|source| ImportError::Fetch {
                    path: candidate.path.clone(),
                    source,
                })?;
            candidate.content = Some(decode_content(&candidate.path, bytes));
        }

        if cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }

        let project = &ctx.request.project;
        storage
            .ensure_folder(&project.storage_root_id, &self.config.images_folder)
            .await?;
        let workspace_id = storage
            .ensure_folder(&project.storage_root_id, &self.config.workspace_folder)
            .await?;
        let clone_root = storage
            .clone_subtree(&ctx.request.source_root_id, &workspace_id)
            .await?;
        ctx.files = FileIndex::collect(storage, &clone_root).await?;
        info!(workspace = %clone_root, files = ctx.files.len(), "Cloned source into workspace");
        ctx.workspace_root_id = Some(clone_root);

        let mut pages = PageIndex::from_candidates(&ctx.importable);
        self.index_existing_pages(&project.id, &ctx.importable, &mut pages)
            .await?;
        let rewriter = Rewriter::new(&project.id, &pages, &ctx.files, &self.config);
        for candidate in ctx.importable.iter_mut() {
            if let Some(content) = candidate.content.as_deref() {
                let rewritten = rewriter.rewrite_content(candidate, content);
                candidate.content = Some(rewritten);
            }
        }

        Ok(Flow::Continue)
    }

    /// Adds pages already in the project that the imported content links to
    /// and that are not part of the import themselves.
    async fn index_existing_pages(
        &self,
        project_id: &str,
        candidates: &[ImportCandidate],
        pages: &mut PageIndex,
    ) -> Result<(), ImportError> {
        let unresolved: BTreeSet<String> = candidates
            .iter()
            .filter_map(|c| c.content.as_deref())
            .flat_map(page_references)
            .filter(|name| pages.resolve(name).is_none())
            .map(normalize_key)
            .collect();

        for name in unresolved {
            if self
                .collaborators
                .wiki
                .find_by_name(project_id, &name)
                .await?
                .is_some()
            {
                debug!(page = %name, "Linking to existing page");
                pages.insert(&name, &name);
            }
        }
        Ok(())
    }

    async fn step_import_batch(
        &self,
        ctx: &mut ImportContext,
        batch: &[usize],
        cancel: &CancellationToken,
    ) -> Flow {
        for &i in batch {
            if cancel.is_cancelled() {
                return Flow::Cancelled;
            }

            let candidate = &ctx.importable[i];
            let parent = match candidate.parent_wiki_name.as_deref() {
                None => None,
                Some(name) => match ctx.page_ids.get(name) {
                    Some(id) => Some(id.clone()),
                    None => {
                        warn!(
                            path = %candidate.path,
                            parent = name,
                            "Skipping page because its parent page was not imported"
                        );
                        continue;
                    }
                },
            };

            match self
                .import_page(&ctx.request.project.id, candidate, parent.as_ref())
                .await
            {
                Ok(write) => {
                    let (status, page_id) = match write {
                        PageWrite::Created(id) | PageWrite::Updated(id) => {
                            ctx.touched.push(id.clone());
                            (CandidateStatus::Success, id)
                        }
                        PageWrite::Unmodified(id) => (CandidateStatus::Unmodified, id),
                    };
                    debug!(path = %candidate.path, %status, "Imported page");
                    ctx.results.push(PageImportResult {
                        status,
                        path: candidate.path.clone(),
                    });
                    ctx.page_ids.insert(candidate.wiki_name.clone(), page_id);
                }
                Err(e) => {
                    warn!(path = %candidate.path, error = %e, "Failed to import page");
                }
            }
        }
        Flow::Continue
    }

    async fn import_page(
        &self,
        project_id: &str,
        candidate: &ImportCandidate,
        parent: Option<&PageId>,
    ) -> Result<PageWrite, WikiError> {
        let pages = self.collaborators.pages.as_ref();
        let wiki = self.collaborators.wiki.as_ref();
        let content = candidate.content.as_deref().unwrap_or_default();

        if candidate.status != CandidateStatus::ValidExists {
            if wiki.find_by_name(project_id, &candidate.wiki_name).await?.is_some() {
                return Err(WikiError::Rejected {
                    name: candidate.wiki_name.clone(),
                    reason: "a page with this name was created after validation".to_string(),
                });
            }
            let id = pages
                .create_page(project_id, &candidate.wiki_name, content, parent)
                .await?;
            return Ok(PageWrite::Created(id));
        }

        // Only a page at the candidate's own path is updated in place.
        let Some(id) = wiki.find_by_path(project_id, &candidate.path).await? else {
            return Err(WikiError::Rejected {
                name: candidate.wiki_name.clone(),
                reason: format!("no page at {} to update", candidate.path),
            });
        };
        if pages.latest_content(&id).await?.as_deref() == Some(content) {
            return Ok(PageWrite::Unmodified(id));
        }
        let version = pages.update_page(&id, content).await?;
        debug!(page = %id, version, "Appended page version");
        Ok(PageWrite::Updated(id))
    }

    fn step_finalize(
        &self,
        ctx: &mut ImportContext,
        progress: &dyn ProgressReporter,
    ) -> ImportOutcome {
        let import_errors: Vec<String> = {
            let imported: HashSet<&str> = ctx.results.iter().map(|r| r.path.as_str()).collect();
            ctx.request
                .candidates
                .iter()
                .filter(|c| c.status.is_importable() && !imported.contains(c.path.as_str()))
                .map(|c| c.path.clone())
                .collect()
        };

        self.schedule_reindex(ctx);

        let (phase, message) = if import_errors.is_empty() {
            (
                ImportPhase::Completed,
                format!("Imported {} pages", ctx.results.len()),
            )
        } else {
            (
                ImportPhase::PartiallyFailed,
                format!(
                    "Imported {} pages, {} failed",
                    ctx.results.len(),
                    import_errors.len()
                ),
            )
        };
        info!(
            imported = ctx.results.len(),
            failed = import_errors.len(),
            "Import finished"
        );
        progress.report(ProgressEvent::Phase { phase, message });

        ImportOutcome::Finished {
            ret: std::mem::take(&mut ctx.results),
            import_errors,
        }
    }

    fn abort(&self, ctx: &ImportContext, progress: &dyn ProgressReporter) -> ImportOutcome {
        info!(imported = ctx.results.len(), "Import cancelled");
        self.schedule_reindex(ctx);
        progress.report(ProgressEvent::Phase {
            phase: ImportPhase::Aborted,
            message: format!("Import cancelled after {} pages", ctx.results.len()),
        });
        ImportOutcome::aborted()
    }

    /// Fire-and-forget reindex of every page written so far.
    fn schedule_reindex(&self, ctx: &ImportContext) {
        if ctx.touched.is_empty() {
            return;
        }
        let indexer = Arc::clone(&self.collaborators.indexer);
        let project_id = ctx.project_id().to_string();
        let page_ids = ctx.touched.clone();

        tokio::spawn(
            async move {
                let count = page_ids.len();
                match indexer.reindex(&project_id, page_ids).await {
                    Ok(()) => debug!(pages = count, "Search index updated"),
                    Err(e) => warn!(error = %e, "Search reindex failed"),
                }
            }
            .in_current_span(),
        );
    }
}

/// Same classification, name and parent as when the caller validated.
fn still_valid(submitted: &ImportCandidate, now: &ImportCandidate) -> bool {
    submitted.status == now.status
        && submitted.wiki_name == now.wiki_name
        && submitted.parent_wiki_name == now.parent_wiki_name
}

/// Groups candidate indices by depth, walking down from the roots.
///
/// Roots are candidates without a parent, in source order; each following
/// level lists the children of the previous one. Candidates whose parent
/// is not among `candidates` never appear.
pub fn depth_batches(candidates: &[ImportCandidate]) -> Vec<Vec<usize>> {
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut level: Vec<usize> = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        match candidate.parent_wiki_name.as_deref() {
            None => level.push(i),
            Some(parent) => children.entry(parent).or_default().push(i),
        }
    }

    let mut visited: HashSet<usize> = HashSet::new();
    let mut batches = Vec::new();
    loop {
        level.retain(|i| visited.insert(*i));
        if level.is_empty() {
            break;
        }
        let next: Vec<usize> = level
            .iter()
            .filter_map(|&i| children.get(candidates[i].wiki_name.as_str()))
            .flatten()
            .copied()
            .collect();
        batches.push(std::mem::replace(&mut level, next));
    }
    batches
}

fn decode_content(path: &str, bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        warn!(path, "Page content is not valid UTF-8, replacing invalid sequences");
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}
