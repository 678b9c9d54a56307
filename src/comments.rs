//! Threaded event comments.
//!
//! Threads are read as one flat row set and assembled in memory. Display
//! covers depths 0 through [`MAX_DISPLAY_DEPTH`]; new replies may only hang
//! off comments shallower than [`MAX_PARENT_DEPTH`].

use std::collections::{HashMap, HashSet};

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::ApiError;
use crate::models::{Comment, CommentRecord, NewComment, Page, PageMeta, User};
use crate::store::Store;

/// Deepest level shown when reading a thread (roots are depth 0).
pub const MAX_DISPLAY_DEPTH: u8 = 3;
/// Parents at this depth or deeper refuse new replies.
pub const MAX_PARENT_DEPTH: u8 = 2;
pub const MAX_CONTENT_CHARS: usize = 2000;

/// Length is measured after trimming, which is what gets stored.
fn comment_content(value: &str, _ctx: &()) -> garde::Result {
    match value.trim().chars().count() {
        0 => Err(garde::Error::new("must not be blank")),
        n if n > MAX_CONTENT_CHARS => Err(garde::Error::new(format!(
            "must be at most {} characters",
            MAX_CONTENT_CHARS
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[garde(custom(comment_content))]
    pub content: String,
    #[garde(range(min = 1))]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[garde(custom(comment_content))]
    pub content: String,
}

/// A comment placed in its thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadedComment {
    #[serde(flatten)]
    pub record: CommentRecord,
    pub depth: u8,
}

/// Depth-first, creation-ordered flattening of an event's comments.
///
/// Siblings are ordered by `(created_at, id)`. Replies below a comment at
/// [`MAX_DISPLAY_DEPTH`] are left out, as are comments whose parent is not
/// in `records`.
pub fn build_thread(records: Vec<CommentRecord>) -> Vec<ThreadedComment> {
    let mut children: HashMap<Option<i64>, Vec<CommentRecord>> = HashMap::new();
    for record in records {
        children
            .entry(record.comment.parent_id)
            .or_default()
            .push(record);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| {
            (a.comment.created_at, a.comment.id).cmp(&(b.comment.created_at, b.comment.id))
        });
    }

    let roots = children.remove(&None).unwrap_or_default();
    let mut stack: Vec<(CommentRecord, u8)> = roots.into_iter().rev().map(|r| (r, 0)).collect();
    let mut visited = HashSet::new();
    let mut thread = Vec::new();

    while let Some((record, depth)) = stack.pop() {
        if !visited.insert(record.comment.id) {
            continue;
        }
        if depth < MAX_DISPLAY_DEPTH {
            if let Some(replies) = children.remove(&Some(record.comment.id)) {
                stack.extend(replies.into_iter().rev().map(|r| (r, depth + 1)));
            }
        }
        thread.push(ThreadedComment { record, depth });
    }
    thread
}

/// One page of an event's thread.
///
/// The page window slides over the flattened thread, so a page may begin
/// in the middle of a conversation. `meta.total` counts every comment on the
/// event, including replies too deep to be displayed.
pub fn event_thread(
    store: &dyn Store,
    event_id: i64,
    page: Page,
) -> Result<(Vec<ThreadedComment>, PageMeta), ApiError> {
    if store.find_event(event_id)?.is_none() {
        return Err(ApiError::not_found("Event"));
    }

    let thread = build_thread(store.event_comments(event_id)?);
    let total = store.count_event_comments(event_id)?;

    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(0);
    let items = thread.into_iter().skip(offset).take(limit).collect();
    Ok((items, PageMeta::new(page, total)))
}

/// Number of ancestors of `comment`, found by walking parent links.
pub fn comment_depth(store: &dyn Store, comment: &Comment) -> Result<u8, ApiError> {
    let mut seen = HashSet::from([comment.id]);
    let mut depth: u8 = 0;
    let mut next = comment.parent_id;

    while let Some(parent_id) = next {
        if !seen.insert(parent_id) {
            return Err(ApiError::internal(format!(
                "comment {} has a cyclic parent chain",
                comment.id
            )));
        }
        let parent = store.find_comment(parent_id)?.ok_or_else(|| {
            ApiError::internal(format!("comment {} has a dangling parent", comment.id))
        })?;
        depth = depth.saturating_add(1);
        next = parent.parent_id;
    }
    Ok(depth)
}

pub fn create_comment(
    store: &dyn Store,
    event_id: i64,
    author: &User,
    request: CreateCommentRequest,
) -> Result<CommentRecord, ApiError> {
    if store.find_event(event_id)?.is_none() {
        return Err(ApiError::not_found("Event"));
    }

    if let Some(parent_id) = request.parent_id {
        let parent = store
            .find_comment(parent_id)?
            .ok_or_else(|| ApiError::bad_request("Parent comment not found"))?;
        if parent.event_id != event_id {
            return Err(ApiError::bad_request(
                "Parent comment belongs to a different event",
            ));
        }
        if comment_depth(store, &parent)? >= MAX_PARENT_DEPTH {
            return Err(ApiError::bad_request("Maximum reply depth reached"));
        }
    }

    let record = store.insert_comment(NewComment {
        event_id,
        user_id: author.id,
        parent_id: request.parent_id,
        content: request.content.trim().to_string(),
    })?;
    tracing::info!(
        comment_id = record.comment.id,
        event_id,
        parent_id = ?record.comment.parent_id,
        "comment created"
    );
    Ok(record)
}

pub fn update_comment(
    store: &dyn Store,
    user: &User,
    comment_id: i64,
    request: UpdateCommentRequest,
) -> Result<CommentRecord, ApiError> {
    let comment = store
        .find_comment(comment_id)?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    if !auth::can_edit_comment(user, &comment) {
        return Err(ApiError::Forbidden);
    }
    store
        .update_comment(comment_id, request.content.trim())?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

pub fn delete_comment(store: &dyn Store, user: &User, comment_id: i64) -> Result<(), ApiError> {
    let comment = store
        .find_comment(comment_id)?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    if !auth::can_delete_comment(user, &comment) {
        return Err(ApiError::Forbidden);
    }
    store.delete_comment(comment_id)?;
    tracing::info!(comment_id, deleted_by = user.id, "comment deleted");
    Ok(())
}
