use duet_shared::constants::GROUPING_GAP_SECS;
use duet_store::Message;

/// Whether `next` renders as a continuation of `prev`: same sender, neither
/// is a system message, and less than three minutes apart.
pub fn groups_with(prev: &Message, next: &Message) -> bool {
    if prev.is_system() || next.is_system() || prev.sender_id != next.sender_id {
        return false;
    }
    let gap = next.created_at - prev.created_at;
    gap.num_milliseconds().abs() < GROUPING_GAP_SECS * 1000
}

/// For each message of an ascending slice, whether it starts a new group.
pub fn group_starts(messages: &[Message]) -> Vec<bool> {
    let mut starts = Vec::with_capacity(messages.len());
    for (i, message) in messages.iter().enumerate() {
        let continues = i > 0 && groups_with(&messages[i - 1], message);
        starts.push(!continues);
    }
    starts
}
