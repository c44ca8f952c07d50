pub mod error_stage {
    pub const PROVISIONING: &str = "provisioning";
    pub const RECEIVING: &str = "receiving";
    pub const PROCESSING: &str = "processing";
    pub const SENDING: &str = "sending";
}

pub mod error_type {
    /// The error was caused by an unreachable or refusing peer.
    pub const CONNECTION_FAILED: &str = "connection_failed";
    /// A value could not be converted into the stored representation.
    pub const CONVERSION_FAILED: &str = "conversion_failed";
    /// The response of a peer could not be decoded.
    pub const PARSER_FAILED: &str = "parser_failed";
    /// A request issued to a peer failed.
    pub const REQUEST_FAILED: &str = "request_failed";
    /// The operation did not complete within its time bound.
    pub const TIMED_OUT: &str = "timed_out";
    /// Writing into the sink failed.
    pub const WRITER_FAILED: &str = "writer_failed";
}
