//! One method per accepted command. Parameters are already lexed by the
//! caller (`Server::dispatch_message`); each handler pulls what it needs
//! off the `Lexer` itself so mandatory/optional/silent acceptance stays
//! local to the command that cares about it.

use irczt_proto::{rpl, Lexer};

use crate::error::ClientError;
use crate::lines;
use crate::user::UserId;
use crate::wire::Reply;

use super::Server;

impl Server {
    pub(super) fn cmd_nick(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        let was_registered = self.clients[id].core().is_registered();

        let nick = match lex.param() {
            Some(n) => n,
            None => {
                self.reply_numeric(id, rpl::ERR_NONICKNAMEGIVEN, &[], lines::NO_NICKNAME_GIVEN);
                return Ok(());
            }
        };
        if !irczt_proto::is_valid_nickname(nick) {
            let attempted = String::from_utf8_lossy(nick).into_owned();
            self.reply_numeric(
                id,
                rpl::ERR_ERRONEUSNICKNAME,
                &[&attempted],
                lines::ERRONEOUS_NICKNAME,
            );
            return Ok(());
        }
        let nick = String::from_utf8_lossy(nick).into_owned();

        let current = self.clients[id].core().nickname().to_owned();
        if nick != current {
            if let Some(&owner) = self.nicknames.get(&nick) {
                if owner != UserId::Client(id) {
                    self.reply_numeric(id, rpl::ERR_NICKNAMEINUSE, &[&nick], lines::NICKNAME_IN_USE);
                    return Ok(());
                }
            }
        }

        self.rename_user(UserId::Client(id), nick);
        self.warn_trailing(id, lex, "NICK");
        self.finish_registration_if_newly_done(id, was_registered);
        Ok(())
    }

    pub(super) fn cmd_user(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        if self.clients[id].core().is_registered() {
            self.reply_numeric(id, rpl::ERR_ALREADYREGISTRED, &[], lines::ALREADY_REGISTRED);
            return Ok(());
        }

        let username = match self.mandatory(id, lex, "USER") {
            Some(p) => String::from_utf8_lossy(p).into_owned(),
            None => return Ok(()),
        };
        if self.mandatory(id, lex, "USER").is_none() {
            return Ok(());
        }
        if self.mandatory(id, lex, "USER").is_none() {
            return Ok(());
        }
        let realname = match self.mandatory(id, lex, "USER") {
            Some(p) => String::from_utf8_lossy(p).into_owned(),
            None => return Ok(()),
        };

        self.clients[id].core_mut().set_user(username, realname);
        self.warn_trailing(id, lex, "USER");
        // Reaching here with USER not already registered (checked above)
        // means completing it now is always a fresh registration.
        self.finish_registration_if_newly_done(id, false);
        Ok(())
    }

    fn finish_registration_if_newly_done(&mut self, id: usize, was_registered: bool) {
        if was_registered || !self.clients[id].core().is_registered() {
            return;
        }
        self.send_welcome(id);
    }

    fn send_welcome(&mut self, id: usize) {
        let user_count =
            self.clients.iter().filter(|(_, c)| c.core().is_registered()).count() + self.bots.len();
        self.reply_numeric(id, rpl::RPL_LUSERCLIENT, &[], &lines::luser_client(user_count));
        self.reply_numeric(id, rpl::RPL_MOTDSTART, &[], &lines::motd_start(&self.hostname));
        self.reply_numeric(id, rpl::RPL_MOTD, &[], &lines::motd(&self.hostname));
        self.reply_numeric(id, rpl::RPL_ENDOFMOTD, &[], lines::END_OF_MOTD);

        let nick = self.clients[id].core().nickname().to_owned();
        let line = Reply::command(lines::CONNECT_SENTINEL, "PRIVMSG")
            .param(&nick)
            .trailing(&lines::welcome_pm(&self.hostname))
            .build();
        self.clients[id].send_line(&line);
    }

    pub(super) fn cmd_quit(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        let reason = match lex.param() {
            Some(r) => String::from_utf8_lossy(r).into_owned(),
            None => lines::DEFAULT_QUIT_MESSAGE.to_owned(),
        };
        self.clients[id]
            .send_line_best_effort(&Reply::bare("ERROR").trailing(&reason).build());
        self.quit_user(UserId::Client(id), &reason);
        Err(ClientError::Quit)
    }

    pub(super) fn cmd_list(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        self.reply_numeric(id, rpl::RPL_LISTSTART, &[], lines::LIST_HEADER);
        match lex.param() {
            Some(list) => {
                let names: Vec<String> = irczt_proto::split_list(list)
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .collect();
                for name in &names {
                    if self.channels.contains_key(name) {
                        self.send_list_line(id, name);
                    }
                }
            }
            None => {
                let names: Vec<String> = self.channels.keys().cloned().collect();
                for name in &names {
                    self.send_list_line(id, name);
                }
            }
        }
        self.reply_numeric(id, rpl::RPL_LISTEND, &[], lines::END_OF_LIST);
        Ok(())
    }

    fn send_list_line(&mut self, id: usize, name: &str) {
        let (count, topic) = {
            let channel = &self.channels[name];
            (channel.member_count(), channel.topic().unwrap_or("").to_owned())
        };
        self.reply_numeric(id, rpl::RPL_LIST, &[name, &count.to_string()], &topic);
    }

    pub(super) fn cmd_join(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        let names: Vec<String> = match self.mandatory(id, lex, "JOIN") {
            Some(list) => irczt_proto::split_list(list)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect(),
            None => return Ok(()),
        };
        self.warn_trailing(id, lex, "JOIN");
        for name in names {
            self.join_one_channel(id, &name);
        }
        Ok(())
    }

    fn join_one_channel(&mut self, id: usize, name: &str) {
        if !self.channels.contains_key(name) {
            self.reply_numeric(id, rpl::ERR_NOSUCHCHANNEL, &[name], lines::NO_SUCH_CHANNEL);
            return;
        }
        // R3: rejoining a channel already joined is a silent no-op.
        if self.clients[id].core().is_in_channel(name) {
            return;
        }

        let user = UserId::Client(id);
        self.clients[id].core_mut().join_channel(name);
        self.channels.get_mut(name).unwrap().join(user);

        let nick = self.clients[id].core().nickname().to_owned();
        let join_line = Reply::command(&nick, "JOIN").param(name).build();
        let members: Vec<UserId> = self.channels[name].members().copied().collect();
        for member in &members {
            self.send_to(*member, &join_line);
        }

        match self.channels[name].topic().map(str::to_owned) {
            Some(topic) => self.reply_numeric(id, rpl::RPL_TOPIC, &[name], &topic),
            None => self.reply_numeric(id, rpl::RPL_NOTOPIC, &[name], lines::NO_TOPIC),
        }

        // Reference behavior: one RPL_NAMREPLY per member rather than one
        // reply enumerating all of them.
        for member in &members {
            let member_nick = self.nickname_of(*member).to_owned();
            self.reply_numeric(id, rpl::RPL_NAMREPLY, &["=", name], &member_nick);
        }
        self.reply_numeric(id, rpl::RPL_ENDOFNAMES, &[name], lines::END_OF_NAMES);
    }

    pub(super) fn cmd_part(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        let names: Vec<String> = match self.mandatory(id, lex, "PART") {
            Some(list) => irczt_proto::split_list(list)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect(),
            None => return Ok(()),
        };
        let message = match lex.param() {
            Some(m) => String::from_utf8_lossy(m).into_owned(),
            None => self.clients[id].core().nickname().to_owned(),
        };
        self.warn_trailing(id, lex, "PART");
        for name in names {
            self.part_one_channel(id, &name, &message);
        }
        Ok(())
    }

    fn part_one_channel(&mut self, id: usize, name: &str, message: &str) {
        if !self.channels.contains_key(name) {
            self.reply_numeric(id, rpl::ERR_NOSUCHCHANNEL, &[name], lines::NO_SUCH_CHANNEL);
            return;
        }
        if !self.clients[id].core().is_in_channel(name) {
            self.reply_numeric(id, rpl::ERR_NOTONCHANNEL, &[name], lines::NOT_ON_CHANNEL);
            return;
        }

        let user = UserId::Client(id);
        let nick = self.clients[id].core().nickname().to_owned();
        let part_line = Reply::command(&nick, "PART").param(name).trailing(message).build();
        let members: Vec<UserId> = self.channels[name].members().copied().collect();
        for member in &members {
            self.send_to(*member, &part_line);
        }

        self.channels.get_mut(name).unwrap().leave(&user);
        self.clients[id].core_mut().leave_channel(name);
    }

    pub(super) fn cmd_who(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        let target = match self.mandatory(id, lex, "WHO") {
            Some(t) => String::from_utf8_lossy(t).into_owned(),
            None => return Ok(()),
        };
        self.warn_trailing(id, lex, "WHO");

        if let Some(channel) = self.channels.get(&target) {
            let members: Vec<UserId> = channel.members().copied().collect();
            let host = self.hostname.clone();
            for member in members {
                let (member_nick, username, realname) = match member {
                    UserId::Client(i) => (
                        self.clients[i].core().nickname().to_owned(),
                        self.clients[i].core().username().to_owned(),
                        self.clients[i].core().realname().to_owned(),
                    ),
                    UserId::Bot(i) => (
                        self.bots[i].core().nickname().to_owned(),
                        self.bots[i].core().username().to_owned(),
                        self.bots[i].core().realname().to_owned(),
                    ),
                };
                let trailing = format!("0 {}", realname);
                self.reply_numeric(
                    id,
                    rpl::RPL_WHOREPLY,
                    &[&target, &username, "hidden", &host, &member_nick, "H"],
                    &trailing,
                );
            }
        }
        self.reply_numeric(id, rpl::RPL_ENDOFWHO, &[&target], lines::END_OF_WHO);
        Ok(())
    }

    pub(super) fn cmd_topic(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        let channel_name = match self.mandatory(id, lex, "TOPIC") {
            Some(c) => String::from_utf8_lossy(c).into_owned(),
            None => return Ok(()),
        };
        if !self.channels.contains_key(&channel_name) {
            self.reply_numeric(id, rpl::ERR_NOSUCHCHANNEL, &[&channel_name], lines::NO_SUCH_CHANNEL);
            return Ok(());
        }

        let new_topic = lex.param().map(|t| String::from_utf8_lossy(t).into_owned());
        self.warn_trailing(id, lex, "TOPIC");

        match new_topic {
            Some(topic) => {
                let topic_opt = if topic.is_empty() { None } else { Some(topic) };
                self.channels.get_mut(&channel_name).unwrap().set_topic(topic_opt);
                let members: Vec<UserId> = self.channels[&channel_name].members().copied().collect();
                for member in members {
                    match self.channels[&channel_name].topic().map(str::to_owned) {
                        Some(t) => self.send_numeric_to(member, rpl::RPL_TOPIC, &[&channel_name], &t),
                        None => self.send_numeric_to(
                            member,
                            rpl::RPL_NOTOPIC,
                            &[&channel_name],
                            lines::NO_TOPIC,
                        ),
                    }
                }
            }
            None => match self.channels[&channel_name].topic().map(str::to_owned) {
                Some(t) => self.reply_numeric(id, rpl::RPL_TOPIC, &[&channel_name], &t),
                None => self.reply_numeric(id, rpl::RPL_NOTOPIC, &[&channel_name], lines::NO_TOPIC),
            },
        }
        Ok(())
    }

    pub(super) fn cmd_privmsg(&mut self, id: usize, lex: &mut Lexer) -> Result<(), ClientError> {
        let targets: Vec<String> = match self.mandatory(id, lex, "PRIVMSG") {
            Some(t) => irczt_proto::split_list(t)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect(),
            None => return Ok(()),
        };
        let text = match self.mandatory(id, lex, "PRIVMSG") {
            Some(t) => String::from_utf8_lossy(t).into_owned(),
            None => return Ok(()),
        };
        self.warn_trailing(id, lex, "PRIVMSG");

        self.privmsg_from(UserId::Client(id), &targets, &text);
        Ok(())
    }
}
