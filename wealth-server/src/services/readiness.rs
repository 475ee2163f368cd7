//! Readiness gates
//!
//! Each gate is a conjunction of preconditions, recomputed from current
//! state whenever it is read. An action whose environment shifted (chain or
//! account switch) since its providers were acquired is never allowed to
//! fire.

use serde::Serialize;

use crate::types::EncryptedHandle;

/// Everything the gates depend on
#[derive(Debug, Clone, Default)]
pub struct GateInputs {
    pub instance_ready: bool,
    pub deployed: bool,
    pub read_provider: bool,
    pub write_provider: bool,
    pub signer: bool,
    /// Chain unchanged since signer/providers were acquired
    pub same_chain: bool,
    /// Signer unchanged since it was acquired
    pub same_signer: bool,
    pub held_handle: Option<EncryptedHandle>,
    pub refreshing: bool,
    pub decrypting: bool,
    pub decrypted: bool,
    pub operating: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gates {
    pub can_fetch_balance: bool,
    pub can_decrypt: bool,
    /// Deposit, withdraw and transfer
    pub can_operate: bool,
}

impl Gates {
    pub fn evaluate(inputs: &GateInputs) -> Self {
        let environment = inputs.instance_ready
            && inputs.deployed
            && inputs.signer
            && inputs.same_chain
            && inputs.same_signer;

        let can_fetch_balance = environment && inputs.read_provider && !inputs.refreshing;

        let holds_balance = inputs.held_handle.map(|h| !h.is_zero()).unwrap_or(false);
        let can_decrypt = environment
            && inputs.read_provider
            && inputs.write_provider
            && holds_balance
            && !inputs.decrypting
            && !inputs.decrypted;

        let can_operate = environment && inputs.write_provider && !inputs.operating;

        Self {
            can_fetch_balance,
            can_decrypt,
            can_operate,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> GateInputs {
        GateInputs {
            instance_ready: true,
            deployed: true,
            read_provider: true,
            write_provider: true,
            signer: true,
            same_chain: true,
            same_signer: true,
            held_handle: Some(EncryptedHandle([9; 32])),
            refreshing: false,
            decrypting: false,
            decrypted: false,
            operating: false,
        }
    }

    #[test]
    fn test_all_gates_open_when_ready() {
        let gates = Gates::evaluate(&ready());
        assert!(gates.can_fetch_balance);
        assert!(gates.can_decrypt);
        assert!(gates.can_operate);
    }

    #[test]
    fn test_undeployed_closes_every_gate() {
        let inputs = GateInputs {
            deployed: false,
            ..ready()
        };
        assert_eq!(Gates::evaluate(&inputs), Gates::none());
    }

    #[test]
    fn test_environment_shift_closes_every_gate() {
        for inputs in [
            GateInputs {
                same_chain: false,
                ..ready()
            },
            GateInputs {
                same_signer: false,
                ..ready()
            },
            GateInputs {
                instance_ready: false,
                ..ready()
            },
            GateInputs {
                signer: false,
                ..ready()
            },
        ] {
            assert_eq!(Gates::evaluate(&inputs), Gates::none());
        }
    }

    #[test]
    fn test_zero_or_missing_handle_blocks_decrypt() {
        let zero = GateInputs {
            held_handle: Some(EncryptedHandle::ZERO),
            ..ready()
        };
        assert!(!Gates::evaluate(&zero).can_decrypt);
        assert!(Gates::evaluate(&zero).can_fetch_balance);

        let missing = GateInputs {
            held_handle: None,
            ..ready()
        };
        assert!(!Gates::evaluate(&missing).can_decrypt);
    }

    #[test]
    fn test_lanes_only_block_themselves() {
        let refreshing = Gates::evaluate(&GateInputs {
            refreshing: true,
            ..ready()
        });
        assert!(!refreshing.can_fetch_balance);
        assert!(refreshing.can_decrypt);
        assert!(refreshing.can_operate);

        let operating = Gates::evaluate(&GateInputs {
            operating: true,
            ..ready()
        });
        assert!(operating.can_fetch_balance);
        assert!(!operating.can_operate);

        let decrypted = Gates::evaluate(&GateInputs {
            decrypted: true,
            ..ready()
        });
        assert!(!decrypted.can_decrypt);
        assert!(decrypted.can_fetch_balance);
    }

    #[test]
    fn test_write_provider_required_for_decrypt_and_operate() {
        let gates = Gates::evaluate(&GateInputs {
            write_provider: false,
            ..ready()
        });
        assert!(gates.can_fetch_balance);
        assert!(!gates.can_decrypt);
        assert!(!gates.can_operate);
    }
}
