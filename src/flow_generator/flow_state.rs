/*
 * Copyright (c) 2022 Yunshan Networks
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::common::{
    enums::{PacketDirection, TcpFlags},
    flow::CloseType,
};

// TCP termination tracking. Only what is needed to decide when a connection
// is over: RST from either side, or FIN seen from both sides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowState {
    #[default]
    Raw,
    Opening1,
    Opening2,
    Established,
    // client sent FIN
    ClosingTx,
    // server sent FIN
    ClosingRx,
    Closed,
    Reset,
}

impl FlowState {
    pub fn next(self, direction: PacketDirection, flags: TcpFlags) -> FlowState {
        if self.is_closed() {
            return self;
        }
        if flags.contains(TcpFlags::RST) {
            return FlowState::Reset;
        }
        if flags.contains(TcpFlags::FIN) {
            return match (self, direction) {
                (FlowState::ClosingRx, PacketDirection::ClientToServer)
                | (FlowState::ClosingTx, PacketDirection::ServerToClient) => FlowState::Closed,
                (_, PacketDirection::ClientToServer) => FlowState::ClosingTx,
                (_, PacketDirection::ServerToClient) => FlowState::ClosingRx,
            };
        }
        match (self, direction) {
            (FlowState::Raw, PacketDirection::ClientToServer)
                if flags & TcpFlags::SYN_ACK == TcpFlags::SYN =>
            {
                FlowState::Opening1
            }
            (FlowState::Raw | FlowState::Opening1, PacketDirection::ServerToClient)
                if flags.contains(TcpFlags::SYN_ACK) =>
            {
                FlowState::Opening2
            }
            (FlowState::Opening2, PacketDirection::ClientToServer)
                if flags.contains(TcpFlags::ACK) =>
            {
                FlowState::Established
            }
            // picked up mid stream
            (FlowState::Raw, _) if !flags.contains(TcpFlags::SYN) => FlowState::Established,
            (state, _) => state,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, FlowState::Closed | FlowState::Reset)
    }

    pub fn close_type(&self) -> CloseType {
        match self {
            FlowState::Closed => CloseType::TcpFin,
            FlowState::Reset => CloseType::TcpReset,
            _ => CloseType::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use PacketDirection::{ClientToServer as C2S, ServerToClient as S2C};

    fn run(steps: &[(PacketDirection, TcpFlags)]) -> FlowState {
        steps
            .iter()
            .fold(FlowState::Raw, |state, (d, f)| state.next(*d, *f))
    }

    #[test]
    fn handshake_and_fin_close() {
        assert_eq!(run(&[(C2S, TcpFlags::SYN)]), FlowState::Opening1);
        assert_eq!(
            run(&[(C2S, TcpFlags::SYN), (S2C, TcpFlags::SYN_ACK), (C2S, TcpFlags::ACK)]),
            FlowState::Established
        );
        let state = run(&[
            (C2S, TcpFlags::SYN),
            (S2C, TcpFlags::SYN_ACK),
            (C2S, TcpFlags::ACK),
            (C2S, TcpFlags::FIN_ACK),
        ]);
        assert_eq!(state, FlowState::ClosingTx);
        assert!(!state.is_closed());
        let state = state.next(S2C, TcpFlags::FIN_ACK);
        assert_eq!(state, FlowState::Closed);
        assert_eq!(state.close_type(), CloseType::TcpFin);
        // trailing ack keeps it closed
        assert_eq!(state.next(C2S, TcpFlags::ACK), FlowState::Closed);
    }

    #[test]
    fn server_fin_first() {
        let state = run(&[(S2C, TcpFlags::FIN_ACK), (C2S, TcpFlags::FIN_ACK)]);
        assert_eq!(state, FlowState::Closed);
    }

    #[test]
    fn fin_from_one_side_only() {
        let state = run(&[(C2S, TcpFlags::FIN_ACK), (C2S, TcpFlags::FIN_ACK)]);
        assert_eq!(state, FlowState::ClosingTx);
    }

    #[test]
    fn reset() {
        let state = run(&[(C2S, TcpFlags::SYN), (S2C, TcpFlags::RST_ACK)]);
        assert_eq!(state, FlowState::Reset);
        assert_eq!(state.close_type(), CloseType::TcpReset);
        assert_eq!(state.next(C2S, TcpFlags::FIN), FlowState::Reset);
    }

    #[test]
    fn midstream_pickup() {
        assert_eq!(run(&[(S2C, TcpFlags::PSH_ACK)]), FlowState::Established);
        assert_eq!(FlowState::Raw.close_type(), CloseType::Unknown);
    }
}
