//! Cross-domain messenger ABI definitions
//!
//! Uses alloy's sol! macro to generate event and call types for the two
//! messenger generations plus the address manager used to look them up.
//!
//! Event signatures must match the deployed messengers bit-exact; the topic0
//! constants are pinned in the tests below.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Bedrock messenger (L1CrossDomainMessenger / L2CrossDomainMessenger)
    interface ICrossDomainMessenger {
        /// Emitted by `sendMessage`; `messageNonce` carries the version in its top two bytes
        event SentMessage(address indexed target, address sender, bytes message, uint256 messageNonce, uint256 gasLimit);

        /// Companion of `SentMessage` carrying the ETH value
        event SentMessageExtension1(address indexed sender, uint256 value);

        event RelayedMessage(bytes32 indexed msgHash);

        event FailedRelayedMessage(bytes32 indexed msgHash);

        /// V1 encoding target; its calldata is what gets hashed
        function relayMessage(uint256 nonce, address sender, address target, uint256 value, uint256 minGasLimit, bytes message) external payable;
    }
}

sol! {
    /// Pre-Bedrock OVM messenger
    interface IOvmCrossDomainMessenger {
        /// `message` is the full `relayMessage(address,address,bytes,uint256)` calldata
        event SentMessage(bytes message);

        /// Not indexed on OVM; the hash travels in the log data
        event RelayedMessage(bytes32 msgHash);

        event FailedRelayedMessage(bytes32 msgHash);

        /// V0 encoding target
        function relayMessage(address target, address sender, bytes message, uint256 messageNonce) external;
    }
}

sol! {
    /// Name registry (`Lib_AddressManager`) holding the messenger proxies
    #[sol(rpc)]
    contract AddressManager {
        function getAddress(string name) external view returns (address);
    }
}

/// Registry name of the L1 messenger proxy
pub const L1_MESSENGER_NAME: &str = "Proxy__OVM_L1CrossDomainMessenger";

/// Registry name of the L2 messenger
pub const L2_MESSENGER_NAME: &str = "OVM_L2CrossDomainMessenger";
