//! Who may edit or delete a piece of content.
//!
//! The answer comes from an ordered table of rules; the first rule that has an
//! opinion wins and its [`Rule`] is reported alongside the verdict. Three tiers
//! of evidence are consulted, strongest first: the authenticated owner id, the
//! per-namespace session token, and presence in the local cache.
//!
//! The result is advisory. The remote store has to enforce owner matching on
//! its own (row-level policies on `user_id`); a client can always skip this.

use crate::models::{Answer, Comment, Id, Question, Review};
use crate::session::SessionNamespace;

/// Identifies an item and the collection it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRef {
    Review(Id),
    Comment { review_id: Id, id: Id },
    Question(Id),
    Answer(Id),
}

impl ContentRef {
    pub fn namespace(self) -> Option<SessionNamespace> {
        match self {
            ContentRef::Review(_) => None,
            ContentRef::Comment { .. } => Some(SessionNamespace::Comments),
            ContentRef::Question(_) => Some(SessionNamespace::Questions),
            ContentRef::Answer(_) => Some(SessionNamespace::Answers),
        }
    }

    fn noun(self) -> &'static str {
        match self {
            ContentRef::Review(_) => "review",
            ContentRef::Comment { .. } => "comment",
            ContentRef::Question(_) => "question",
            ContentRef::Answer(_) => "answer",
        }
    }
}

pub trait OwnedContent {
    fn owner_user_id(&self) -> Option<&str>;
    fn session_id(&self) -> Option<&str>;
    fn content_ref(&self) -> ContentRef;
}

/// What the resolver needs to know about the acting party.
pub trait OwnershipContext {
    fn authenticated_user_id(&self) -> Option<&str>;
    /// Current session token for `namespace`, empty when there is none.
    fn session_id(&self, namespace: SessionNamespace) -> String;
    /// Whether the item is present in the local cache snapshot of its collection.
    fn is_locally_cached(&self, item: ContentRef) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    OwnerMatches,
    OwnerMismatch,
    SessionMatches,
    /// No session token was recorded but the item sits in this cache.
    /// Loose legacy policy, kept as-is.
    CachedLegacy,
    /// Ownerless, sessionless item offered to any signed-in actor.
    /// Loose legacy policy, kept as-is.
    AdoptedBySignedIn,
    NoEvidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub rule: Rule,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("you do not have permission to modify this {noun}")]
pub struct OwnershipDenied {
    pub noun: &'static str,
    pub rule: Rule,
}

impl Decision {
    /// Turns a denial into an error, to be raised before anything is dispatched.
    pub fn ensure(self, item: ContentRef) -> Result<(), OwnershipDenied> {
        if self.allowed {
            Ok(())
        } else {
            Err(OwnershipDenied { noun: item.noun(), rule: self.rule })
        }
    }
}

struct Facts<'a> {
    owner: Option<&'a str>,
    actor: Option<&'a str>,
    item_session: Option<&'a str>,
    item: ContentRef,
}

type RuleFn = fn(&Facts<'_>, &dyn OwnershipContext) -> Option<bool>;

const RULES: [(Rule, RuleFn); 5] = [
    (Rule::OwnerMatches, owner_matches),
    (Rule::OwnerMismatch, owner_mismatch),
    (Rule::SessionMatches, session_matches),
    (Rule::CachedLegacy, cached_legacy),
    (Rule::AdoptedBySignedIn, adopted_by_signed_in),
];

fn owner_matches(f: &Facts<'_>, _: &dyn OwnershipContext) -> Option<bool> {
    match (f.owner, f.actor) {
        (Some(owner), Some(actor)) if owner == actor => Some(true),
        _ => None,
    }
}

// terminal: once a strong owner exists and differs, weaker evidence is ignored
fn owner_mismatch(f: &Facts<'_>, _: &dyn OwnershipContext) -> Option<bool> {
    match (f.owner, f.actor) {
        (Some(owner), Some(actor)) if owner != actor => Some(false),
        _ => None,
    }
}

fn session_matches(f: &Facts<'_>, ctx: &dyn OwnershipContext) -> Option<bool> {
    if f.owner.is_some() {
        return None;
    }
    let item_session = f.item_session?;
    let current = ctx.session_id(f.item.namespace()?);
    (!current.is_empty() && current == item_session).then_some(true)
}

fn cached_legacy(f: &Facts<'_>, ctx: &dyn OwnershipContext) -> Option<bool> {
    if f.owner.is_some() || f.item_session.is_some() {
        return None;
    }
    ctx.is_locally_cached(f.item).then_some(true)
}

fn adopted_by_signed_in(f: &Facts<'_>, _: &dyn OwnershipContext) -> Option<bool> {
    (f.owner.is_none() && f.item_session.is_none() && f.actor.is_some()).then_some(true)
}

fn present(v: Option<&str>) -> Option<&str> {
    v.filter(|s| !s.is_empty())
}

pub fn resolve(item: &dyn OwnedContent, ctx: &dyn OwnershipContext) -> Decision {
    let facts = Facts {
        owner: present(item.owner_user_id()),
        actor: present(ctx.authenticated_user_id()),
        item_session: present(item.session_id()),
        item: item.content_ref(),
    };
    RULES
        .iter()
        .find_map(|(rule, check)| check(&facts, ctx).map(|allowed| Decision { allowed, rule: *rule }))
        .unwrap_or(Decision { allowed: false, rule: Rule::NoEvidence })
}

impl OwnedContent for Review {
    fn owner_user_id(&self) -> Option<&str> {
        self.owner_user_id.as_deref()
    }
    fn session_id(&self) -> Option<&str> {
        None
    }
    fn content_ref(&self) -> ContentRef {
        ContentRef::Review(self.id)
    }
}

impl OwnedContent for Comment {
    fn owner_user_id(&self) -> Option<&str> {
        self.owner_user_id.as_deref()
    }
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
    fn content_ref(&self) -> ContentRef {
        ContentRef::Comment { review_id: self.review_id, id: self.id }
    }
}

impl OwnedContent for Question {
    fn owner_user_id(&self) -> Option<&str> {
        self.owner_user_id.as_deref()
    }
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
    fn content_ref(&self) -> ContentRef {
        ContentRef::Question(self.id)
    }
}

impl OwnedContent for Answer {
    fn owner_user_id(&self) -> Option<&str> {
        self.owner_user_id.as_deref()
    }
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
    fn content_ref(&self) -> ContentRef {
        ContentRef::Answer(self.id)
    }
}
