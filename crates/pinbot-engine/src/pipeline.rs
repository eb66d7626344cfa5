//! Command pipeline: runs an agent's declared commands in order, chaining
//! the item each one interacted with into the next.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use pinbot_hooks::{StatusEvent, StatusRegistry};
use pinbot_types::{Agent, CommentItem, ContentItem, EdgeKind};

use crate::backend::{
    ActionBackend, BearerToken, ContentSource, CreatePayload, GenerationPurpose,
    GenerationRequest, Oracle,
};
use crate::command::CommandKind;
use crate::error::EngineError;
use crate::recorder::RelationshipRecorder;
use crate::selection::SelectionError;

/// What one pipeline run needs from the running cycle.
pub struct PipelineContext<'a> {
    /// Refreshed to the committed state after every recorded edge.
    pub agent: &'a mut Agent,
    pub token: &'a BearerToken,
    pub stop: &'a AtomicBool,
}

#[derive(Debug, Default, Clone)]
pub struct PipelineRun {
    pub executed: Vec<CommandKind>,
    pub skipped: Vec<CommandKind>,
    /// A stop request ended the run before the last step.
    pub halted: bool,
    /// The chained item after the last step.
    pub last_item: Option<ContentItem>,
}

pub struct CommandPipeline {
    content: Arc<dyn ContentSource>,
    oracle: Arc<dyn Oracle>,
    actions: Arc<dyn ActionBackend>,
    recorder: Arc<RelationshipRecorder>,
    status: Arc<StatusRegistry>,
}

impl CommandPipeline {
    pub fn new(
        content: Arc<dyn ContentSource>,
        oracle: Arc<dyn Oracle>,
        actions: Arc<dyn ActionBackend>,
        recorder: Arc<RelationshipRecorder>,
        status: Arc<StatusRegistry>,
    ) -> Self {
        Self {
            content,
            oracle,
            actions,
            recorder,
            status,
        }
    }

    /// Run `steps` in order against `item`.
    ///
    /// The stop flag is checked before every step; steps already run stay
    /// committed. Backend and selection failures skip their step only; any
    /// other error ends the run.
    pub async fn execute(
        &self,
        ctx: &mut PipelineContext<'_>,
        steps: &[CommandKind],
        item: Option<ContentItem>,
    ) -> Result<PipelineRun, EngineError> {
        let mut run = PipelineRun::default();
        let mut current = item;

        for &step in steps {
            if ctx.stop.load(Ordering::SeqCst) {
                info!(agent_id = %ctx.agent.id, step = %step, "Stop requested, halting pipeline");
                run.halted = true;
                break;
            }

            let outcome = match (step, current.clone()) {
                (CommandKind::Create, _) => self.create(ctx).await.map(|_| None),
                (_, None) => {
                    debug!(agent_id = %ctx.agent.id, step = %step, "No current item, skipping");
                    run.skipped.push(step);
                    continue;
                }
                (CommandKind::Like, Some(target)) => self.like(ctx, target).await.map(Some),
                (CommandKind::Comment, Some(target)) => self.comment(ctx, target).await.map(Some),
                (CommandKind::Reply, Some(target)) => self.reply(ctx, target).await.map(Some),
            };

            match outcome {
                Ok(next) => {
                    if next.is_some() {
                        current = next;
                    }
                    run.executed.push(step);
                }
                Err(e) if e.is_step_local() => {
                    warn!(agent_id = %ctx.agent.id, step = %step, "Step failed: {e}");
                    self.status
                        .emit(StatusEvent::log(
                            &ctx.agent.id,
                            format!("{} failed to {step}: {e}", ctx.agent.nickname),
                        ))
                        .await;
                    run.skipped.push(step);
                }
                Err(e) => return Err(e),
            }
        }

        run.last_item = current;
        Ok(run)
    }

    async fn like(
        &self,
        ctx: &mut PipelineContext<'_>,
        item: ContentItem,
    ) -> Result<ContentItem, EngineError> {
        self.actions.like(ctx.token, &item.id).await?;
        self.recorder
            .record(ctx.agent, EdgeKind::Liked, &item.id)
            .await?;
        self.log(ctx.agent, format!("liked {}", item.id)).await;
        Ok(item)
    }

    async fn comment(
        &self,
        ctx: &mut PipelineContext<'_>,
        item: ContentItem,
    ) -> Result<ContentItem, EngineError> {
        let text = self
            .generate(ctx.agent, GenerationPurpose::Comment, item_context(&item))
            .await?;
        self.actions.comment(ctx.token, &item.id, &text).await?;
        self.recorder
            .record(ctx.agent, EdgeKind::CommentedOn, &item.id)
            .await?;
        self.log(ctx.agent, format!("commented on {}: {text}", item.id))
            .await;
        Ok(item)
    }

    /// Reply to one existing comment, or comment on the item when it has none.
    async fn reply(
        &self,
        ctx: &mut PipelineContext<'_>,
        item: ContentItem,
    ) -> Result<ContentItem, EngineError> {
        let comments = if item.comment_count > 0 {
            self.content.list_comments(&item.id).await?
        } else {
            Vec::new()
        };
        if comments.is_empty() {
            debug!(
                agent_id = %ctx.agent.id,
                item_id = %item.id,
                "No comments to reply to, commenting instead"
            );
            return self.comment(ctx, item).await;
        }

        let context = format!(
            "{}\n\nComments:\n{}",
            item_context(&item),
            render_comments(&comments)
        );
        let answer = self
            .generate(ctx.agent, GenerationPurpose::Reply, context)
            .await?;
        let (index, text) = parse_reply(&answer, comments.len())?;
        let target = &comments[index];

        self.actions
            .reply_to_comment(ctx.token, &target.id, &text)
            .await?;
        self.recorder
            .record_reply(ctx.agent, &item.id, &target.id)
            .await?;
        self.log(ctx.agent, format!("replied to comment {}: {text}", target.id))
            .await;
        Ok(item)
    }

    async fn create(&self, ctx: &mut PipelineContext<'_>) -> Result<String, EngineError> {
        let text = self
            .generate(ctx.agent, GenerationPurpose::Post, String::new())
            .await?;
        let payload = CreatePayload {
            text_content: text,
            tags: ctx.agent.interests.clone(),
            locale: ctx.agent.locale.clone(),
        };
        let created_id = self.actions.create(ctx.token, &payload).await?;
        self.recorder
            .record(ctx.agent, EdgeKind::Created, &created_id)
            .await?;
        self.log(ctx.agent, format!("created {created_id}")).await;
        Ok(created_id)
    }

    async fn generate(
        &self,
        agent: &Agent,
        purpose: GenerationPurpose,
        context: String,
    ) -> Result<String, EngineError> {
        let request = GenerationRequest {
            purpose,
            profile: agent.profile_text(),
            interests: agent.interests_text(),
            context,
        };
        Ok(self.oracle.generate(&request).await?)
    }

    async fn log(&self, agent: &Agent, action: String) {
        info!(agent_id = %agent.id, "{action}");
        self.status
            .emit(StatusEvent::log(&agent.id, format!("{} {action}", agent.nickname)))
            .await;
    }
}

fn item_context(item: &ContentItem) -> String {
    let tags = item
        .tags
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Title: {}\nTags: {tags}", item.text)
}

/// One-based numbered comment listing.
pub fn render_comments(comments: &[CommentItem]) -> String {
    comments
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c.text.replace(['\r', '\n'], " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse `"<n> - <reply text>"` into a zero-based comment index and the text.
pub fn parse_reply(answer: &str, candidates: usize) -> Result<(usize, String), SelectionError> {
    let malformed = || SelectionError::MalformedReply(answer.trim().to_string());
    let (number, text) = answer.split_once(" - ").ok_or_else(malformed)?;
    let number: usize = number
        .trim()
        .trim_end_matches('.')
        .parse()
        .map_err(|_| malformed())?;
    let text = text.trim();
    if text.is_empty() {
        return Err(malformed());
    }
    if number == 0 || number > candidates {
        return Err(SelectionError::IndexOutOfRange {
            index: number,
            candidates,
        });
    }
    Ok((number - 1, text.to_string()))
}
