#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

/// A post row without its attachment bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub author: String,
    pub title: String,
    pub content: String,
    pub file_name: Option<String>,
    pub date: String,
    pub likes: i64,
}

impl Post {
    pub fn has_attachment(&self) -> bool {
        self.file_name.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: String,
    pub comment: String,
    pub date: String,
}
