use transport::SrtSocket;

/// Which side of a connection is rendering statistics — the two sides
/// use different thresholds for when filter counters join the common
/// totals, mirroring the `SNDR_O`/`RCVR_O` macro pair in the original
/// statistics renderer (`SNDR_O(l, x) = l >= x`, `RCVR_O(l, x) = l >= 5 + x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Receiver,
    Sender,
}

impl Direction {
    /// Level at which filter counters join the render, for this
    /// direction: a `Sender` exposes them from level 2; a `Receiver`
    /// needs the level 5 higher, level 7, matching `RCVR_O`'s offset
    /// over `SNDR_O`.
    fn extended_level(self) -> u8 {
        match self {
            Direction::Sender => 2,
            Direction::Receiver => 7,
        }
    }
}

/// Renders a socket's statistics at the given verbosity level:
/// `0` = nothing, `1` = totals and counters, `>=2` = plus byte-level and
/// filter counters (level clamped to what the socket implementation
/// understands).
pub fn render(socket: &dyn SrtSocket, direction: Direction, level: u8) -> String {
    let clamped = level.min(direction.extended_level());
    socket.statistics(clamped, " ")
}
