//! Planet Core Library
//!
//! Authoring and following decentralized sites, including:
//! - Entities (Planet, Article, Draft, Attachment) and their on-disk layout
//! - Attachment ledger and the draft commit protocol
//! - Planet store with per-planet in-flight guards
//! - Publishing through a content-addressing node
//! - Subscription sync and article merging

pub mod error;
pub mod persist;
pub mod layout;
pub mod attachment;
pub mod article;
pub mod render;
pub mod draft;
pub mod planet;
pub mod guard;
pub mod node;
pub mod store;
pub mod publish;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use error::{PlanetError, Result};
pub use layout::{FollowingPlanetLayout, MyPlanetLayout, RootLayout};
pub use attachment::{Attachment, AttachmentKind, AttachmentLedger, AttachmentRoots, AttachmentStatus};
pub use article::{FollowingArticle, MyArticle, PublicArticle};
pub use draft::{Draft, DraftEngine, DraftKind, DraftRef};
pub use planet::{FollowingPlanet, MyPlanet, PublicPlanet};
pub use guard::{InFlight, InFlightGuard};
pub use node::ContentNode;
pub use store::{FollowingPlanetHandle, MyPlanetHandle, PlanetStore};
pub use publish::{PublishOutcome, Publisher};
pub use subscription::{MergeReport, SubscriptionSync, UpdateOutcome, merge_articles};
