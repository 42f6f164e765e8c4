//! Consumer-driven contract testing.
//!
//! A consumer describes the HTTP interactions it relies on as a [`Contract`]
//! whose expected responses use [`Matcher`]s instead of literal values. The
//! [`ContractStore`] moves contract documents between files and a [`Broker`],
//! the [`Verifier`] replays every interaction against a live provider and
//! reports structural mismatches, and the [`CompatibilityGate`] decides
//! whether a participant version may be deployed to an environment.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod contract;
pub mod error;
pub mod gate;
pub mod matcher;
pub mod provider;
pub mod store;
pub mod verification;
pub mod version;

pub use broker::{
    Broker, BrokerConfig, ConsumerVersionSelector, ContractId, ContractRevision, FetchedContract,
    HttpBroker, InMemoryBroker, VerificationLedger, VerificationRecord,
};
pub use contract::{
    Contract, ContractMetadata, Interaction, PactSpecification, Participant, Request, Response,
};
pub use error::{ErrorCategory, PactError, PactResult};
pub use gate::{CompatibilityGate, CompatibilityRecord, EntryStatus, MatrixEntry};
pub use matcher::{
    JsonPath, MatchResult, Matcher, Mismatch, MismatchKind, PathSegment, Template, ValueKind,
};
pub use provider::{HttpProviderClient, HttpStateSetup};
pub use store::ContractStore;
pub use verification::{
    NoStateSetup, ProviderClient, ProviderResponse, StateSetup, VerificationOutcome,
    VerificationReport, Verifier, VerifierConfig, compare,
};
pub use version::{
    CiContext, Clock, GitCli, ParticipantVersion, SystemClock, VcsLookup, VersionOverrides,
    VersionResolver, VersionSource,
};
