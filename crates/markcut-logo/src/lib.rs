pub mod border;
pub mod discovery;
pub mod dump;
pub mod error;
pub mod mask;
pub mod matcher;
pub mod sobel;
pub mod store;

pub use border::{BorderConfig, BorderDetector, BorderEvent, BorderKind};
pub use discovery::{
    CandidateMatcher, CandidateStorage, DiscoveredLogo, DiscoveryConfig, DiscoveryOutcome,
    LogoDiscoverer, MutualVoting, NotFoundReason, StorageKind,
};
pub use dump::{DebugDump, DumpError};
pub use error::{LogoError, LogoResult, MaskIoError};
pub use mask::{LogoMask, MatchResult};
pub use matcher::{LogoMatcher, LogoState, MatchStep, MatcherConfig, Transition};
pub use sobel::{BLANK, EDGE, EdgeMap, EdgePlane, SobelConfig, SobelTransform};
pub use store::{MaskRepository, decode_pgm, encode_pgm};
