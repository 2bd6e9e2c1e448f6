//! The bot tick: join phase, part phase, message phase, run once per bot
//! per second (and once more at spawn time).

use rand::Rng;

use crate::user::UserId;
use crate::wire::Reply;

use super::Server;

impl Server {
    pub(super) fn run_bot_ticks(&mut self) {
        let ids: Vec<usize> = self.bots.iter().map(|(k, _)| k).collect();
        for id in ids {
            self.bot_tick(id);
        }
    }

    pub(super) fn bot_tick(&mut self, bot_id: usize) {
        self.bot_join_phase(bot_id);
        self.bot_part_phase(bot_id);
        self.bot_message_phase(bot_id);
    }

    /// Proportional selection: walk the unjoined channels once, joining
    /// the i-th one with probability `need_remaining / unjoined_remaining`
    /// so the expected number joined equals `need` without biasing toward
    /// channels earlier in index order.
    fn bot_join_phase(&mut self, bot_id: usize) {
        let joined = self.bots[bot_id].core().channels().count() as u32;
        let target = self.bots[bot_id].channels_target;
        let mut need = target.saturating_sub(joined);
        if need == 0 {
            return;
        }

        let unjoined: Vec<String> = self
            .channels
            .keys()
            .filter(|name| !self.bots[bot_id].core().is_in_channel(name))
            .cloned()
            .collect();
        let total = unjoined.len();
        for (i, name) in unjoined.into_iter().enumerate() {
            if need == 0 {
                break;
            }
            let remaining = (total - i) as f64;
            let p = (need as f64 / remaining).min(1.0);
            if self.rng.gen_bool(p) {
                self.bot_join_channel(bot_id, &name);
                need -= 1;
            }
        }
    }

    fn bot_join_channel(&mut self, bot_id: usize, name: &str) {
        let user = UserId::Bot(bot_id);
        self.bots[bot_id].core_mut().join_channel(name);
        self.channels.get_mut(name).unwrap().join(user);

        let nick = self.bots[bot_id].core().nickname().to_owned();
        let line = Reply::command(&nick, "JOIN").param(name).build();
        let members: Vec<UserId> = self.channels[name].members().copied().collect();
        for member in members {
            self.send_to(member, &line);
        }
    }

    fn bot_part_phase(&mut self, bot_id: usize) {
        let channels: Vec<String> = self.bots[bot_id].core().channels().map(str::to_owned).collect();
        let rate = self.bots[bot_id].channels_leave_rate.clamp(0.0, 1.0);
        for name in channels {
            if self.rng.gen_bool(rate) {
                self.bot_part_channel(bot_id, &name);
            }
        }
    }

    fn bot_part_channel(&mut self, bot_id: usize, name: &str) {
        let user = UserId::Bot(bot_id);
        let nick = self.bots[bot_id].core().nickname().to_owned();
        let part_line = Reply::command(&nick, "PART").param(name).trailing(&nick).build();
        let members: Vec<UserId> = self.channels[name].members().copied().collect();
        for member in members {
            self.send_to(member, &part_line);
        }
        self.channels.get_mut(name).unwrap().leave(&user);
        self.bots[bot_id].core_mut().leave_channel(name);
    }

    fn bot_message_phase(&mut self, bot_id: usize) {
        let channels: Vec<String> = self.bots[bot_id].core().channels().map(str::to_owned).collect();
        let rate = self.bots[bot_id].message_rate.clamp(0.0, 1.0);
        for name in channels {
            if self.rng.gen_bool(rate) {
                let text = self.compose_bot_message(bot_id);
                if !text.is_empty() {
                    self.privmsg_from(UserId::Bot(bot_id), &[name], &text);
                }
            }
        }
    }

    /// Draws a word count uniformly from `[1, 2*message_length - 1]` and
    /// concatenates that many random words from the word bank, stopping
    /// before the 1024-byte local buffer would overflow.
    fn compose_bot_message(&mut self, bot_id: usize) -> String {
        if self.word_bank.is_empty() {
            return String::new();
        }
        let length = self.bots[bot_id].message_length.max(1);
        let upper = (2 * length).saturating_sub(1).max(1);
        let word_count = self.rng.gen_range(1..=upper);

        let mut msg = String::new();
        for _ in 0..word_count {
            let word = &self.word_bank[self.rng.gen_range(0..self.word_bank.len())];
            let extra = if msg.is_empty() { word.len() } else { word.len() + 1 };
            if msg.len() + extra > 1024 {
                break;
            }
            if !msg.is_empty() {
                msg.push(' ');
            }
            msg.push_str(word);
        }
        msg
    }
}

#[cfg(test)]
mod tests {
    use std::io::{ErrorKind, Read, Write};
    use std::net::{TcpListener as StdTcpListener, TcpStream as StdTcpStream};

    use crate::client::Client;
    use crate::config::{BotRanges, Config, FloatRange, IntRange};

    use super::*;

    fn degenerate_ranges(target: u32, leave_rate: f64, message_rate: f64, length: u32) -> BotRanges {
        BotRanges {
            channels_target: IntRange { min: target, max: target },
            channels_leave_rate: FloatRange { min: leave_rate, max: leave_rate },
            message_rate: FloatRange { min: message_rate, max: message_rate },
            message_length: IntRange { min: length, max: length },
        }
    }

    fn server_with(ranges: BotRanges, word_bank: &[&str]) -> Server {
        let mut config = Config::sample();
        config.listen = "127.0.0.1:0".to_owned();
        config.channels = vec!["#lobby".to_owned()];
        config.bots.clear();
        config.bot_ranges = ranges;
        config.word_bank = word_bank.iter().map(|s| (*s).to_string()).collect();
        Server::new(&config).expect("server construction")
    }

    fn attach_listener(server: &mut Server) -> (usize, StdTcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (server_side, peer) = listener.accept().unwrap();
        client.set_nonblocking(true).unwrap();
        server_side.set_nonblocking(true).unwrap();
        let id = server.clients.insert(Client::new(mio::net::TcpStream::from_std(server_side), peer));
        (id, client)
    }

    fn drain(conn: &mut StdTcpStream) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match conn.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => panic!("unexpected read error: {}", e),
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn a_bot_targeting_one_channel_always_joins_the_only_one_available() {
        // channels_target == 1 with a single configured channel makes
        // bot_join_phase's per-channel probability exactly 1.0, so the
        // outcome doesn't depend on the RNG's seed.
        let mut server = server_with(degenerate_ranges(1, 0.0, 0.0, 3), &[]);
        let (client_id, mut conn) = attach_listener(&mut server);

        server.spawn_bot("chatbot".to_owned());
        let bot_id = server.bots.iter().next().unwrap().0;

        assert!(server.bots[bot_id].core().is_in_channel("#lobby"));
        assert!(server.channels["#lobby"].is_member(UserId::Bot(bot_id)));
        assert_eq!(drain(&mut conn), ":chatbot JOIN #lobby\r\n");
        let _ = client_id;
    }

    #[test]
    fn zero_leave_rate_never_parts_a_joined_channel() {
        let mut server = server_with(degenerate_ranges(1, 0.0, 0.0, 3), &[]);
        server.spawn_bot("chatbot".to_owned());
        let bot_id = server.bots.iter().next().unwrap().0;

        for _ in 0..20 {
            server.bot_tick(bot_id);
        }
        assert!(server.bots[bot_id].core().is_in_channel("#lobby"));
    }

    #[test]
    fn full_leave_rate_parts_every_joined_channel() {
        let mut server = server_with(degenerate_ranges(1, 1.0, 0.0, 3), &[]);
        let (_client_id, mut conn) = attach_listener(&mut server);

        server.spawn_bot("chatbot".to_owned());
        let bot_id = server.bots.iter().next().unwrap().0;
        drain(&mut conn); // the spawn-time join

        server.bot_tick(bot_id);
        assert!(!server.bots[bot_id].core().is_in_channel("#lobby"));
        assert!(!server.channels["#lobby"].is_member(UserId::Bot(bot_id)));
        assert_eq!(drain(&mut conn), ":chatbot PART #lobby :chatbot\r\n");
    }

    #[test]
    fn full_message_rate_speaks_from_the_word_bank_on_every_tick() {
        let mut server = server_with(degenerate_ranges(1, 0.0, 1.0, 2), &["hello", "world"]);
        let (_client_id, mut conn) = attach_listener(&mut server);

        server.spawn_bot("chatbot".to_owned());
        let bot_id = server.bots.iter().next().unwrap().0;
        drain(&mut conn); // the spawn-time join, no message yet: just joined

        server.bot_tick(bot_id);
        let out = drain(&mut conn);
        assert!(out.starts_with(":chatbot PRIVMSG #lobby :"));
        assert!(out.ends_with("\r\n"));
        let body = out.trim_start_matches(":chatbot PRIVMSG #lobby :").trim_end_matches("\r\n");
        assert!(body.split(' ').all(|w| w == "hello" || w == "world"));
    }

    #[test]
    fn empty_word_bank_produces_no_message() {
        let mut server = server_with(degenerate_ranges(1, 0.0, 1.0, 2), &[]);
        server.spawn_bot("chatbot".to_owned());
        let bot_id = server.bots.iter().next().unwrap().0;
        // No panic, and no channel traffic beyond the join: compose_bot_message
        // returns empty and bot_message_phase skips sending.
        server.bot_tick(bot_id);
        assert!(server.bots[bot_id].core().is_in_channel("#lobby"));
    }
}
