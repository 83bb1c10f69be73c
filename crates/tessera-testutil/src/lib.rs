//! Shared fixtures for market tests: deterministic DAGs, an in-memory
//! network for both market protocols, and fake node facades with instant
//! chain operations.

pub mod dag;
pub mod ipld_tree;
pub mod net;
pub mod nodes;

pub use dag::{build_test_dag, dag_prefix, raw_prefix, TestDag};
pub use ipld_tree::TestIpldTree;
pub use net::{
    ask_stream_pair, retrieval_deal_stream_pair, retrieval_query_stream_pair,
    storage_deal_stream_pair, RetrievalNetHandle, StorageNetHandle, TestAskStream,
    TestRetrievalDealStream, TestRetrievalNetwork, TestRetrievalQueryStream,
    TestStorageDealStream, TestStorageNetwork,
};
pub use nodes::{
    FakeDataTransfer, FakeRetrievalClientNode, FakeRetrievalProviderNode, FakeStorageClientNode,
    FakeStorageProviderNode,
};
