pub mod page;
pub mod site_type;
pub mod url;

pub use page::{
    ClassificationMethod, ClassificationResult, DedupVerdict, DedupVerdictStatus, FrontierEntry, HtmlFlavor, PageRecord,
};
pub use site_type::{DetectionConfidence, SiteType, SiteTypeDetection};
pub use url::{CanonicalUrl, RejectReason};
