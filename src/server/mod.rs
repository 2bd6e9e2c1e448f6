//! The readiness-driven event loop and the object graph it drives.
//!
//! Split across several files, mirroring how the handlers for a
//! protocol-heavy state machine tend to get grouped once they stop fitting
//! in one screenful:
//!
//! - `mod.rs`: the `Server` type, the event loop, and shared send/index
//!   utilities.
//! - `handlers.rs`: one `cmd_*` method per accepted command.
//! - `bots.rs`: the bot tick.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use slab::Slab;

use irczt_proto::{rpl, Command, Lexer};

use crate::bot::LocalBot;
use crate::channel::Channel;
use crate::client::Client;
use crate::config::{BotRanges, Config};
use crate::error::{ClientError, StartupError};
use crate::lines;
use crate::user::UserId;
use crate::wire::{self, Reply};

mod bots;
mod handlers;

const LISTENER_TOKEN: Token = Token(0);
const STDIN_TOKEN: Token = Token(1);
const TOKEN_OFFSET: usize = 2;
const BOT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

pub struct Server {
    clients: Slab<Client>,
    bots: Slab<LocalBot>,
    channels: BTreeMap<String, Channel>,
    nicknames: BTreeMap<String, UserId>,
    hostname: String,
    word_bank: Vec<String>,
    bot_ranges: BotRanges,
    rng: ChaCha8Rng,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    next_bot_tick: Instant,
}

impl Server {
    pub fn new(config: &Config) -> Result<Server, StartupError> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| StartupError::AddrParse(config.listen.clone(), e))?;

        let mut listener =
            TcpListener::bind(addr).map_err(|e| StartupError::Bind(addr, e))?;
        let poll = Poll::new().map_err(StartupError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(StartupError::Poll)?;
        poll.registry()
            .register(&mut SourceFd(&0), STDIN_TOKEN, Interest::READABLE)
            .map_err(StartupError::Poll)?;

        let mut channels = BTreeMap::new();
        for name in &config.channels {
            channels.insert(name.clone(), Channel::new(name.clone()));
        }

        let mut server = Server {
            clients: Slab::new(),
            bots: Slab::new(),
            channels,
            nicknames: BTreeMap::new(),
            hostname: config.hostname().to_owned(),
            word_bank: config.word_bank.clone(),
            bot_ranges: config.bot_ranges.clone(),
            rng: ChaCha8Rng::from_entropy(),
            poll,
            events: Events::with_capacity(256),
            listener,
            next_bot_tick: Instant::now() + BOT_TICK_INTERVAL,
        };

        for preset in &config.bots {
            server.spawn_bot(preset.nickname.clone());
        }

        Ok(server)
    }

    fn spawn_bot(&mut self, nickname: String) {
        let ranges = self.bot_ranges.clone();
        let bot = LocalBot::new(nickname.clone(), &ranges, &mut self.rng);
        let id = self.bots.insert(bot);
        self.nicknames.insert(nickname, UserId::Bot(id));
        self.bot_tick(id);
    }

    /// Runs the readiness loop until stdin signals shutdown or the
    /// readiness facility itself fails.
    pub fn run(mut self) -> Result<(), StartupError> {
        loop {
            let now = Instant::now();
            let timeout = if now >= self.next_bot_tick {
                self.run_bot_ticks();
                self.next_bot_tick = now + BOT_TICK_INTERVAL;
                BOT_TICK_INTERVAL
            } else {
                (self.next_bot_tick - now).min(BOT_TICK_INTERVAL)
            };

            match self.poll.poll(&mut self.events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StartupError::Poll(e)),
            }

            let tokens: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
            for token in tokens {
                match token {
                    LISTENER_TOKEN => self.accept_clients(),
                    STDIN_TOKEN => {
                        log::info!("Exit request");
                        self.shutdown();
                        return Ok(());
                    }
                    Token(raw) if raw >= TOKEN_OFFSET => {
                        let id = raw - TOKEN_OFFSET;
                        if !self.clients.contains(id) {
                            continue;
                        }
                        if let Err(err) = self.process_client_readable(id) {
                            let reason = quit_reason_for(&err);
                            self.destroy_client(id, reason);
                        }
                    }
                    _ => {}
                }
            }

            self.reap_dead_clients();
        }
    }

    /// A broadcast fan-out (`send_to`) marks a recipient `dead` on a failed
    /// write without destroying it mid-broadcast, so a client other than the
    /// one just processed can end up carrying the flag. Sweep the whole
    /// arena once per loop iteration and terminate every one found, per
    /// §7's "I/O failure on a client socket: log and terminate that
    /// connection."
    fn reap_dead_clients(&mut self) {
        let dead_ids: Vec<usize> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_dead())
            .map(|(id, _)| id)
            .collect();
        for id in dead_ids {
            self.destroy_client(id, "write failed");
        }
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut socket, addr)) => {
                    let entry = self.clients.vacant_entry();
                    let token = Token(entry.key() + TOKEN_OFFSET);
                    match self.poll.registry().register(&mut socket, token, Interest::READABLE) {
                        Ok(()) => {
                            entry.insert(Client::new(socket, addr));
                            log::info!("{}: connected", addr);
                        }
                        Err(e) => log::warn!("{}: failed to register: {}", addr, e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn process_client_readable(&mut self, id: usize) -> Result<(), ClientError> {
        let mut messages: Vec<Vec<u8>> = Vec::new();
        if let Err(e) = self.clients[id].fill(|line| messages.push(line.to_vec())) {
            // Reassembler-level protocol errors (lone CR, oversize message)
            // haven't had a chance to tell the client why yet, unlike
            // dispatch-level errors which reply for themselves before
            // returning. EndOfFile/Io need no reply: the peer is gone.
            if let irczt_reader::ReassembleError::Malformed(reason) = &e {
                self.clients[id]
                    .send_line_best_effort(&Reply::bare("ERROR").trailing(reason).build());
            }
            return Err(e.into());
        }
        for line in &messages {
            self.dispatch_message(id, line)?;
        }
        Ok(())
    }

    fn dispatch_message(&mut self, id: usize, line: &[u8]) -> Result<(), ClientError> {
        log::debug!("{}: {}", self.clients[id].addr(), wire::escape(line));

        let mut lex = Lexer::new(line);
        if line.first() == Some(&b':') {
            let prefix = &lex.word().unwrap()[1..];
            let current = self.clients[id].core().nickname();
            if prefix != current.as_bytes() {
                self.clients[id]
                    .send_line_best_effort(&Reply::bare("ERROR").trailing(lines::BAD_PREFIX).build());
                return Err(ClientError::Malformed("message prefix does not match the nickname"));
            }
        }

        let command_word = match lex.word() {
            Some(w) => w,
            None => {
                self.clients[id].send_line_best_effort(
                    &Reply::bare("ERROR").trailing(lines::NO_COMMAND_SPECIFIED).build(),
                );
                return Err(ClientError::Malformed("no command specified"));
            }
        };

        let command = match Command::from_bytes(command_word) {
            Some(c) => c,
            None => {
                let word = String::from_utf8_lossy(command_word).into_owned();
                self.reply_numeric(id, rpl::ERR_UNKNOWNCOMMAND, &[&word], lines::UNKNOWN_COMMAND);
                return Ok(());
            }
        };

        let registered = self.clients[id].core().is_registered();
        if !registered && !matches!(command, Command::Nick | Command::User | Command::Quit) {
            self.reply_numeric(id, rpl::ERR_NOTREGISTERED, &[], lines::NOT_REGISTERED);
            return Ok(());
        }

        match command {
            Command::Nick => self.cmd_nick(id, &mut lex),
            Command::User => self.cmd_user(id, &mut lex),
            Command::Quit => self.cmd_quit(id, &mut lex),
            Command::List => self.cmd_list(id, &mut lex),
            Command::Join => self.cmd_join(id, &mut lex),
            Command::Part => self.cmd_part(id, &mut lex),
            Command::Who => self.cmd_who(id, &mut lex),
            Command::Topic => self.cmd_topic(id, &mut lex),
            Command::PrivMsg => self.cmd_privmsg(id, &mut lex),
        }
    }

    /// Implements `User::quit`: notify everyone sharing a channel with
    /// `user` exactly once (P5), then silently drop the membership on both
    /// sides. Does not touch the nickname index or the owning arena:
    /// that's the caller's job (`destroy_client`/`destroy_bot`), since
    /// plain PART-like channel loss never applies here.
    fn quit_user(&mut self, user: UserId, reason: &str) {
        let nick = self.nickname_of(user).to_owned();
        let channels: Vec<String> = self.channels_of(user);
        let quit_line = Reply::command(&nick, "QUIT").trailing(reason).build();

        let mut notified: BTreeSet<UserId> = BTreeSet::new();
        for name in &channels {
            if let Some(channel) = self.channels.get(name) {
                let members: Vec<UserId> = channel.members().copied().collect();
                for member in members {
                    if member != user && notified.insert(member) {
                        self.send_to(member, &quit_line);
                    }
                }
            }
        }
        for name in &channels {
            if let Some(channel) = self.channels.get_mut(name) {
                channel.leave(&user);
            }
        }
        self.clear_channels(user);
    }

    fn destroy_client(&mut self, id: usize, reason: &str) {
        self.quit_user(UserId::Client(id), reason);
        let nick = self.clients[id].core().nickname().to_owned();
        if self.nicknames.get(&nick) == Some(&UserId::Client(id)) {
            self.nicknames.remove(&nick);
        }
        let addr = self.clients[id].addr();
        let mut client = self.clients.remove(id);
        let _ = self.poll.registry().deregister(client.socket_mut());
        client.shutdown();
        log::info!("{}: disconnected ({})", addr, reason);
    }

    fn destroy_bot(&mut self, id: usize) {
        self.quit_user(UserId::Bot(id), "bot removed");
        let nick = self.bots[id].core().nickname().to_owned();
        if self.nicknames.get(&nick) == Some(&UserId::Bot(id)) {
            self.nicknames.remove(&nick);
        }
        self.bots.remove(id);
    }

    /// S3: channels are destroyed only once every client/bot has been
    /// destroyed first, so each channel's member set is already empty by
    /// the time its `Drop` impl asserts that.
    fn shutdown(&mut self) {
        let client_ids: Vec<usize> = self.clients.iter().map(|(k, _)| k).collect();
        for id in client_ids {
            self.destroy_client(id, "server shutdown");
        }
        let bot_ids: Vec<usize> = self.bots.iter().map(|(k, _)| k).collect();
        for id in bot_ids {
            self.destroy_bot(id);
        }
        self.channels.clear();
    }

    // --- shared send/index utilities, in the spirit of ellidri's `send`,
    // `broadcast`, `find_channel`, `find_nick`. ---

    fn nickname_of(&self, user: UserId) -> &str {
        match user {
            UserId::Client(i) => self.clients[i].core().nickname(),
            UserId::Bot(i) => self.bots[i].core().nickname(),
        }
    }

    fn channels_of(&self, user: UserId) -> Vec<String> {
        match user {
            UserId::Client(i) => self.clients[i].core().channels().map(str::to_owned).collect(),
            UserId::Bot(i) => self.bots[i].core().channels().map(str::to_owned).collect(),
        }
    }

    fn clear_channels(&mut self, user: UserId) {
        match user {
            UserId::Client(i) => {
                self.clients[i].core_mut().take_channels();
            }
            UserId::Bot(i) => {
                self.bots[i].core_mut().take_channels();
            }
        }
    }

    fn send_to(&mut self, user: UserId, line: &str) {
        if let UserId::Client(i) = user {
            self.clients[i].send_line(line);
        }
    }

    /// insert-before-remove nickname rename, per `User::set_nick`'s
    /// contract: the new key is visible before the old one disappears.
    fn rename_user(&mut self, user: UserId, new_nick: String) {
        self.nicknames.insert(new_nick.clone(), user);
        let old = match user {
            UserId::Client(i) => self.clients[i].core_mut().set_nick(new_nick.clone()),
            UserId::Bot(i) => self.bots[i].core_mut().set_nick(new_nick.clone()),
        };
        if let Some(old) = old {
            if old != new_nick {
                self.nicknames.remove(&old);
            }
        }
    }

    fn mandatory<'a>(&mut self, id: usize, lex: &mut Lexer<'a>, command: &str) -> Option<&'a [u8]> {
        match lex.param() {
            Some(p) => Some(p),
            None => {
                self.reply_numeric(id, rpl::ERR_NEEDMOREPARAMS, &[command], lines::NEED_MORE_PARAMS);
                None
            }
        }
    }

    fn warn_trailing(&self, id: usize, lex: &Lexer, command: &str) {
        if !lex.at_end() {
            log::warn!(
                "{}: {}: ignoring extra parameters",
                self.clients[id].addr(),
                command
            );
        }
    }

    fn reply_numeric(&mut self, id: usize, code: u16, extra: &[&str], trailing: &str) {
        self.send_numeric_to(UserId::Client(id), code, extra, trailing);
    }

    fn send_numeric_to(&mut self, user: UserId, code: u16, extra: &[&str], trailing: &str) {
        let nick = self.nickname_of(user).to_owned();
        let host = self.hostname.clone();
        let mut r = Reply::numeric(&host, code).param(&nick);
        for p in extra {
            r = r.param(p);
        }
        let line = r.trailing(trailing).build();
        self.send_to(user, &line);
    }

    fn privmsg_from(&mut self, sender: UserId, targets: &[String], text: &str) {
        let sender_nick = self.nickname_of(sender).to_owned();
        for target in targets {
            if self.channels.contains_key(target) {
                let line = Reply::command(&sender_nick, "PRIVMSG").param(target).trailing(text).build();
                let members: Vec<UserId> = self.channels[target].members().copied().collect();
                for member in members {
                    if member != sender {
                        self.send_to(member, &line);
                    }
                }
            } else if let Some(&owner) = self.nicknames.get(target) {
                let line = Reply::command(&sender_nick, "PRIVMSG").param(target).trailing(text).build();
                self.send_to(owner, &line);
            } else if let UserId::Client(id) = sender {
                self.reply_numeric(id, rpl::ERR_NOSUCHNICK, &[target], lines::NO_SUCH_NICK);
            }
        }
    }
}

fn quit_reason_for(err: &ClientError) -> &'static str {
    match err {
        ClientError::Malformed(_) => "protocol error",
        ClientError::EndOfFile => "EOF",
        ClientError::Quit => "quit",
        ClientError::Io(_) => "I/O error",
    }
}
