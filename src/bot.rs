//! A [`LocalBot`] wraps a [`UserCore`] with tick policy parameters: how many
//! channels it wants to sit in, how readily it leaves one, how often it
//! speaks, and how long its messages are. The tick itself (it needs the
//! server's channel index and RNG) lives on [`crate::server::Server`].

use crate::config::BotRanges;
use crate::user::UserCore;

pub struct LocalBot {
    core: UserCore,
    pub channels_target: u32,
    pub channels_leave_rate: f64,
    pub message_rate: f64,
    pub message_length: u32,
}

impl LocalBot {
    pub fn new(nickname: String, ranges: &BotRanges, rng: &mut impl rand::Rng) -> Self {
        let mut core = UserCore::default();
        core.set_nick(nickname.clone());
        core.set_user(nickname.clone(), nickname);
        LocalBot {
            core,
            channels_target: ranges.channels_target.sample(rng),
            channels_leave_rate: ranges.channels_leave_rate.sample(rng),
            message_rate: ranges.message_rate.sample(rng),
            message_length: ranges.message_length.sample(rng),
        }
    }

    pub fn core(&self) -> &UserCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut UserCore {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use crate::config::{BotRanges, FloatRange, IntRange};

    use super::*;

    fn ranges() -> BotRanges {
        BotRanges {
            channels_target: IntRange { min: 2, max: 2 },
            channels_leave_rate: FloatRange { min: 0.25, max: 0.25 },
            message_rate: FloatRange { min: 0.5, max: 0.5 },
            message_length: IntRange { min: 4, max: 4 },
        }
    }

    #[test]
    fn new_bot_is_registered_under_its_nickname() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let bot = LocalBot::new("chatbot".to_owned(), &ranges(), &mut rng);
        assert_eq!(bot.core().nickname(), "chatbot");
        assert!(bot.core().is_registered());
        assert_eq!(bot.core().channels().count(), 0);
    }

    #[test]
    fn degenerate_range_always_samples_its_single_value() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let bot = LocalBot::new("chatbot".to_owned(), &ranges(), &mut rng);
        assert_eq!(bot.channels_target, 2);
        assert_eq!(bot.channels_leave_rate, 0.25);
        assert_eq!(bot.message_rate, 0.5);
        assert_eq!(bot.message_length, 4);
    }
}
