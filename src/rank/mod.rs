//! Ranking pipeline — pure, in-memory post-processors over search results.
//!
//! Three composable stages applied in a fixed order by [`pipeline::run`]:
//! minimum-score filter → temporal decay ([`decay`]) → MMR diversity
//! reranking ([`mmr`]) → hard limit. [`fuse`] merges independently produced
//! FTS and vector lists ahead of the pipeline. No stage touches storage and
//! no state is shared between invocations.

pub mod decay;
pub mod fuse;
pub mod mmr;
pub mod pipeline;
