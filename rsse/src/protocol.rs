//! The four-phase search flow shared by both range schemes:
//! build the index, derive a token, let the server search, resolve locally.

use crate::{
    chain::{ChainScheme, ChainToken},
    cluster::{ClusterScheme, ClusterToken},
    dtypes::{DocumentIdSet, InvertedIndex, QueryRange},
    error::RsseError,
    logging::LatencyMetric,
    server::ChainResponse,
};

/// A range-searchable encrypted index together with the server it uploads to.
pub trait RangeScheme {
    /// Client-side search token.
    type Token;
    /// What the server sends back for a token.
    type Response;

    /// Short name used in metrics and reports.
    fn name(&self) -> &'static str;

    /// Encrypts `index` and uploads it to the server.
    fn build_index(
        &mut self,
        index: &InvertedIndex,
        sorted_keywords: &[String],
    ) -> Result<(), RsseError>;

    /// Derives the token for `range`.
    fn gen_token(&self, range: &QueryRange) -> Result<Self::Token, RsseError>;

    /// Server side of a search.
    fn search(&self, token: &Self::Token) -> Self::Response;

    /// Turns the server's answer into document ids.
    fn resolve(
        &self,
        token: &Self::Token,
        response: Self::Response,
    ) -> Result<DocumentIdSet, RsseError>;

    /// Runs token generation, server search and local resolution.
    ///
    /// Records the end-to-end latency and the client-only latency, which
    /// leaves out the server search.
    fn query(&self, range: &QueryRange) -> Result<DocumentIdSet, RsseError> {
        let end_to_end_latency = LatencyMetric::new(&format!("{}_query_end_to_end", self.name()));
        let mut client_latency = LatencyMetric::new(&format!("{}_query_client", self.name()));
        let token = self.gen_token(range)?;
        client_latency.pause();
        let response = self.search(&token);
        client_latency.resume();
        let result = self.resolve(&token, response)?;
        client_latency.finish();
        end_to_end_latency.finish();
        Ok(result)
    }
}

impl RangeScheme for ClusterScheme {
    type Token = ClusterToken;
    type Response = Vec<Vec<u8>>;

    fn name(&self) -> &'static str {
        "cluster"
    }

    fn build_index(
        &mut self,
        index: &InvertedIndex,
        sorted_keywords: &[String],
    ) -> Result<(), RsseError> {
        ClusterScheme::build_index(self, index, sorted_keywords)
    }

    fn gen_token(&self, range: &QueryRange) -> Result<ClusterToken, RsseError> {
        ClusterScheme::gen_token(self, range)
    }

    fn search(&self, token: &ClusterToken) -> Vec<Vec<u8>> {
        self.search_tokens(token)
    }

    fn resolve(
        &self,
        token: &ClusterToken,
        response: Vec<Vec<u8>>,
    ) -> Result<DocumentIdSet, RsseError> {
        self.local_search(token, &response)
    }
}

impl RangeScheme for ChainScheme {
    type Token = ChainToken;
    type Response = ChainResponse;

    fn name(&self) -> &'static str {
        "chain"
    }

    fn build_index(
        &mut self,
        index: &InvertedIndex,
        sorted_keywords: &[String],
    ) -> Result<(), RsseError> {
        ChainScheme::build_index(self, index, sorted_keywords)
    }

    fn gen_token(&self, range: &QueryRange) -> Result<ChainToken, RsseError> {
        ChainScheme::gen_token(self, range)
    }

    fn search(&self, token: &ChainToken) -> ChainResponse {
        self.server_search(token)
    }

    fn resolve(
        &self,
        token: &ChainToken,
        response: ChainResponse,
    ) -> Result<DocumentIdSet, RsseError> {
        self.local_parse(token, &response)
    }
}
