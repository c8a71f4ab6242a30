use percent_encoding::utf8_percent_encode;

use crate::api::{ApiError, PATH_SEGMENT};
use crate::data::{CommentService, PostService};
use crate::model::{Comment, CommentFilter, NewComment, Post, ReplyType};

pub const COMMENT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_SHARE_BASE: &str = "https://chat.toxiq.xyz";

#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("comment text is empty")]
    EmptyComment,
    #[error("reply target {0} is not part of this thread")]
    UnknownParent(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A post with its top-level comments and their replies.
#[derive(Debug, Clone)]
pub struct Thread {
    pub post: Post,
    pub comments: Vec<Comment>,
}

impl Thread {
    /// Loads the post and its discussion. Only the post itself is required;
    /// comment and reply listings degrade to empty on failure.
    pub fn load(
        post_id: &str,
        posts: &dyn PostService,
        comments: &dyn CommentService,
    ) -> Result<Self, ApiError> {
        let post = posts.get_post(post_id)?;

        let mut top_level = comments
            .load_comments(&CommentFilter::comments(post_id, COMMENT_PAGE_SIZE))
            .unwrap_or_else(|err| {
                tracing::warn!(post = post_id, error = %err, "failed to load comments");
                Vec::new()
            });

        for comment in &mut top_level {
            match comments.load_comments(&CommentFilter::replies(&comment.id, COMMENT_PAGE_SIZE)) {
                Ok(replies) => {
                    comment.reply_count = replies.len() as i64;
                    comment.replies = replies;
                }
                Err(err) => {
                    tracing::warn!(comment = %comment.id, error = %err, "failed to load replies");
                }
            }
        }

        Ok(Self {
            post,
            comments: top_level,
        })
    }

    pub fn comment_mut(&mut self, id: &str) -> Option<&mut Comment> {
        for comment in &mut self.comments {
            if comment.id == id {
                return Some(comment);
            }
            if let Some(reply) = comment.replies.iter_mut().find(|reply| reply.id == id) {
                return Some(reply);
            }
        }
        None
    }

    /// Top-level comment that owns `id`, whether `id` is that comment or one
    /// of its replies.
    fn parent_of(&self, id: &str) -> Option<usize> {
        self.comments.iter().position(|comment| {
            comment.id == id || comment.replies.iter().any(|reply| reply.id == id)
        })
    }

    /// Posts a comment, or a reply when `reply_to` names a comment in this
    /// thread. Replies to a reply attach to its top-level comment.
    pub fn submit(
        &mut self,
        comments: &dyn CommentService,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<Comment, ThreadError> {
        if text.trim().is_empty() && reply_to.is_none() {
            return Err(ThreadError::EmptyComment);
        }
        let parent = match reply_to {
            Some(id) => Some(
                self.parent_of(id)
                    .ok_or_else(|| ThreadError::UnknownParent(id.to_string()))?,
            ),
            None => None,
        };

        let request = NewComment {
            content: text.to_string(),
            post_id: self.post.id.clone(),
            is_reply: parent.is_some(),
            replied_to: parent.map(|idx| self.comments[idx].id.clone()),
        };
        let mut created = comments.submit(&request)?;
        created.content = text.to_string();

        match parent {
            Some(idx) => {
                let parent = &mut self.comments[idx];
                parent.replies.push(created.clone());
                parent.reply_count += 1;
            }
            None => {
                created.replies.clear();
                self.comments.insert(0, created.clone());
            }
        }
        self.post.comment_count += 1;
        Ok(created)
    }
}

/// Quoted content a post replies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPreview {
    pub kind: ReplyType,
    pub user_name: String,
    pub name: String,
    pub content: String,
}

/// Loads what `post` replies to. Supplementary: any failure yields `None`,
/// except deleted notes which render as "Content Deleted".
pub fn reply_preview(post: &Post, posts: &dyn PostService) -> Option<ReplyPreview> {
    let (kind, id) = post.reply_ref()?;
    let from_post = |quoted: Post| ReplyPreview {
        kind,
        user_name: quoted.user_name,
        name: quoted.name,
        content: quoted.content,
    };
    let anon = |content: String| ReplyPreview {
        kind,
        user_name: "Anon".into(),
        name: String::new(),
        content,
    };

    let result = match kind {
        ReplyType::Text => posts.get_post(id).map(from_post),
        ReplyType::Prompt => posts.get_prompt(id).map(from_post),
        ReplyType::Note => {
            return Some(match posts.get_note(id) {
                Ok(note) => anon(note.content),
                Err(_) => anon("Content Deleted".into()),
            })
        }
        ReplyType::Comment | ReplyType::Non | ReplyType::Other(_) => return None,
    };

    result
        .map_err(|err| {
            tracing::warn!(post = %post.id, reply = id, error = %err, "failed to load reply preview");
        })
        .ok()
}

pub fn share_url(base: &str, post_id: &str) -> String {
    format!(
        "{}/posts/{}",
        base.trim_end_matches('/'),
        utf8_percent_encode(post_id, PATH_SEGMENT)
    )
}
