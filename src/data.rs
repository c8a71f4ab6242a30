use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::api::{self, ApiError};
use crate::model::{
    Comment, CommentFilter, FeedFilter, FeedPage, LoginResponse, NewComment, Note, Post, PostType,
    Profile, ReplyType, SupportStatus,
};
use crate::vote::{TargetKind, VoteTarget};

pub trait FeedService: Send + Sync {
    fn load_page(&self, filter: &FeedFilter) -> Result<FeedPage, ApiError>;
}

pub trait PostService: Send + Sync {
    fn get_post(&self, id: &str) -> Result<Post, ApiError>;
    fn get_prompt(&self, id: &str) -> Result<Post, ApiError>;
    fn get_note(&self, id: &str) -> Result<Note, ApiError>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>, ApiError>;
    fn submit(&self, comment: &NewComment) -> Result<Comment, ApiError>;
}

pub trait VoteService: Send + Sync {
    fn upvote(&self, target: &VoteTarget) -> Result<(), ApiError>;
    fn downvote(&self, target: &VoteTarget) -> Result<(), ApiError>;
    fn remove_vote(&self, target: &VoteTarget) -> Result<(), ApiError>;
}

pub trait AuthService: Send + Sync {
    fn web_login(&self, init_data: &str) -> Result<LoginResponse, ApiError>;
}

pub struct ApiFeedService {
    client: Arc<api::Client>,
}

impl ApiFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for ApiFeedService {
    fn load_page(&self, filter: &FeedFilter) -> Result<FeedPage, ApiError> {
        self.client.feed(filter)
    }
}

pub struct ApiPostService {
    client: Arc<api::Client>,
}

impl ApiPostService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl PostService for ApiPostService {
    fn get_post(&self, id: &str) -> Result<Post, ApiError> {
        self.client.post(id)
    }

    fn get_prompt(&self, id: &str) -> Result<Post, ApiError> {
        self.client.prompt(id)
    }

    fn get_note(&self, id: &str) -> Result<Note, ApiError> {
        self.client.note(id)
    }
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for ApiCommentService {
    fn load_comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>, ApiError> {
        self.client.comments(filter)
    }

    fn submit(&self, comment: &NewComment) -> Result<Comment, ApiError> {
        self.client.make_comment(comment)
    }
}

pub struct ApiVoteService {
    client: Arc<api::Client>,
}

impl ApiVoteService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl VoteService for ApiVoteService {
    fn upvote(&self, target: &VoteTarget) -> Result<(), ApiError> {
        match target.kind {
            TargetKind::Post => self.client.upvote_post(&target.id),
            TargetKind::Comment => self.client.upvote_comment(&target.id),
        }
    }

    fn downvote(&self, target: &VoteTarget) -> Result<(), ApiError> {
        match target.kind {
            TargetKind::Post => self.client.downvote_post(&target.id),
            TargetKind::Comment => self.client.downvote_comment(&target.id),
        }
    }

    fn remove_vote(&self, target: &VoteTarget) -> Result<(), ApiError> {
        match target.kind {
            TargetKind::Post => self.client.remove_post_vote(&target.id),
            TargetKind::Comment => Err(ApiError::Unsupported {
                operation: "removing a comment vote",
            }),
        }
    }
}

pub struct ApiAuthService {
    client: Arc<api::Client>,
}

impl ApiAuthService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl AuthService for ApiAuthService {
    fn web_login(&self, init_data: &str) -> Result<LoginResponse, ApiError> {
        self.client.web_login(init_data)
    }
}

const MOCK_TOTAL_PAGES: u32 = 3;

/// Offline feed with a fixed number of generated pages.
#[derive(Default)]
pub struct MockFeedService;

impl FeedService for MockFeedService {
    fn load_page(&self, filter: &FeedFilter) -> Result<FeedPage, ApiError> {
        if filter.page == 0 || filter.page > MOCK_TOTAL_PAGES {
            return Ok(FeedPage {
                posts: Vec::new(),
                total_pages: MOCK_TOTAL_PAGES,
            });
        }
        let first = (filter.page - 1) * filter.count;
        let posts = (first..first + filter.count)
            .map(|n| {
                mock_post(
                    &format!("sample-{:04}", n + 1),
                    &format!(
                        "Sample post {} ({} / {})",
                        n + 1,
                        filter.audience,
                        filter.sort
                    ),
                )
            })
            .collect();
        Ok(FeedPage {
            posts,
            total_pages: MOCK_TOTAL_PAGES,
        })
    }
}

#[derive(Default)]
pub struct MockPostService;

impl PostService for MockPostService {
    fn get_post(&self, id: &str) -> Result<Post, ApiError> {
        Ok(mock_post(id, "Posts are served from sample data while offline."))
    }

    fn get_prompt(&self, id: &str) -> Result<Post, ApiError> {
        Ok(mock_post(id, "What did you learn this week?"))
    }

    fn get_note(&self, _id: &str) -> Result<Note, ApiError> {
        Ok(Note {
            content: "An anonymous note.".into(),
        })
    }
}

/// Offline comments. Submitted comments are kept in memory so they show up
/// on the next load.
#[derive(Default)]
pub struct MockCommentService {
    submitted: Mutex<Vec<(NewComment, Comment)>>,
}

impl CommentService for MockCommentService {
    fn load_comments(&self, filter: &CommentFilter) -> Result<Vec<Comment>, ApiError> {
        let submitted = self.submitted.lock();
        let mut comments: Vec<Comment> = submitted
            .iter()
            .filter(|(new, _)| {
                if filter.is_reply {
                    new.replied_to.as_deref() == Some(filter.id.as_str())
                } else {
                    !new.is_reply && new.post_id == filter.id
                }
            })
            .map(|(_, comment)| comment.clone())
            .collect();
        if !filter.is_reply {
            comments.push(mock_comment(&format!("{}-c1", filter.id), "First!"));
        }
        Ok(comments)
    }

    fn submit(&self, comment: &NewComment) -> Result<Comment, ApiError> {
        let mut submitted = self.submitted.lock();
        let created = mock_comment(
            &format!("local-{}", submitted.len() + 1),
            comment.content.as_str(),
        );
        submitted.push((comment.clone(), created.clone()));
        Ok(created)
    }
}

#[derive(Default)]
pub struct MockVoteService;

impl VoteService for MockVoteService {
    fn upvote(&self, _target: &VoteTarget) -> Result<(), ApiError> {
        Ok(())
    }

    fn downvote(&self, _target: &VoteTarget) -> Result<(), ApiError> {
        Ok(())
    }

    fn remove_vote(&self, _target: &VoteTarget) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAuthService;

impl AuthService for MockAuthService {
    fn web_login(&self, _init_data: &str) -> Result<LoginResponse, ApiError> {
        Ok(LoginResponse {
            token: Some("offline".into()),
            profile: Some(Profile {
                id: None,
                user_name: "offline".into(),
                name: "Offline".into(),
            }),
        })
    }
}

fn mock_post(id: &str, content: &str) -> Post {
    Post {
        id: id.into(),
        user_name: "toxiq".into(),
        name: "Toxiq".into(),
        content: content.into(),
        kind: PostType::Text,
        post_color: None,
        post_media: Vec::new(),
        support_status: SupportStatus::Neutral,
        support_count: 0,
        comment_count: 1,
        reply_type: ReplyType::Non,
        reply_ref_id: None,
        date_created: Some(Utc::now().to_rfc3339()),
    }
}

fn mock_comment(id: &str, content: &str) -> Comment {
    Comment {
        id: id.into(),
        user_name: "toxiq".into(),
        name: "Toxiq".into(),
        content: content.into(),
        support_status: SupportStatus::Neutral,
        support_count: 0,
        reply_count: 0,
        replies: Vec::new(),
        date_created: Some(Utc::now().to_rfc3339()),
    }
}
