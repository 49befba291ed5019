use clap::{App, Arg};
use flux::logging;
use pulsar::dictionary::{DictionaryKind, VERBOSITY_NORMAL};
use pulsar::prelude::*;
use pulsar::rdm::{Data, NAME_TYPE_USER_NAME, SERVICE_GROUP_FILTER, SERVICE_INFO_FILTER, SERVICE_STATE_FILTER};
use std::net::{SocketAddr, ToSocketAddrs};
use std::process;
use std::time::Duration;

const LOGIN_STREAM: i32 = 1;
const DIRECTORY_STREAM: i32 = 2;
const FIELD_STREAM: i32 = 3;
const ENUM_STREAM: i32 = 4;

struct Probe {
    consumer: SimpleConsumer,
    codec: BinaryCodec,
    log: logging::Logger,
}

impl Probe {
    fn send(&mut self, msg: &Msg) -> Result<(), String> {
        let payload = self.codec.encode_to_vec(msg).map_err(|err| err.to_string())?;
        self.consumer.send(&payload).map_err(|err| err.to_string())
    }

    /// Next message, answering heartbeats on the way.
    fn receive(&mut self) -> Result<Msg, String> {
        loop {
            match self.consumer.receive().map_err(|err| err.to_string())? {
                Received::Ping => {
                    logging::debug!(self.log, "ping received");
                    self.consumer.send_ping().map_err(|err| err.to_string())?;
                }
                Received::Message(payload) => return self.codec.decode(&payload).map_err(|err| err.to_string()),
            }
        }
    }

    fn expect_refresh(&mut self, stream_id: i32) -> Result<Msg, String> {
        let msg = self.receive()?;

        match (msg.class, msg.stream_id) {
            (MsgClass::Refresh, id) if id == stream_id => Ok(msg),
            _ => Err(format!(
                "expected refresh on stream {}, got {:?} on stream {}: {:?}",
                stream_id, msg.class, msg.stream_id, msg.state
            )),
        }
    }

    fn login(&mut self, user: &str) -> Result<(), String> {
        let key = MsgKey::named(user).with_name_type(NAME_TYPE_USER_NAME);
        self.send(&Msg::request(DomainType::LOGIN, LOGIN_STREAM, key))?;

        let refresh = self.expect_refresh(LOGIN_STREAM)?;
        let text = refresh.state.map(|state| state.text).unwrap_or_default();

        logging::info!(self.log, "logged in"; "user" => user, "state" => text);
        Ok(())
    }

    fn directory(&mut self) -> Result<(), String> {
        let filter = SERVICE_INFO_FILTER | SERVICE_STATE_FILTER | SERVICE_GROUP_FILTER;
        self.send(&Msg::request(
            DomainType::SOURCE,
            DIRECTORY_STREAM,
            MsgKey::default().with_filter(filter),
        ))?;

        let refresh = self.expect_refresh(DIRECTORY_STREAM)?;
        let services = match refresh.payload {
            Data::Map(services) => services,
            _ => return Err("directory refresh without service map".to_string()),
        };

        for service in &services {
            logging::info!(self.log, "service"; "id" => service.key);
        }

        Ok(())
    }

    fn dictionary(&mut self, kind: DictionaryKind, stream_id: i32, service_id: u16, into: &mut DataDictionary) -> Result<usize, String> {
        let key = MsgKey::named(kind.name())
            .with_service_id(service_id)
            .with_filter(VERBOSITY_NORMAL);
        self.send(&Msg::request(DomainType::DICTIONARY, stream_id, key))?;

        let mut parts = 0;
        loop {
            let part = self.expect_refresh(stream_id)?;
            parts += 1;

            let series = match &part.payload {
                Data::Series(series) => series,
                _ => return Err(format!("{} part without series", kind.name())),
            };

            let applied = match kind {
                DictionaryKind::Field => into.apply_field_part(series),
                DictionaryKind::EnumType => into.apply_enum_part(series),
            };
            applied.map_err(|err| err.to_string())?;

            if part.has_flag(MsgFlags::REFRESH_COMPLETE) {
                return Ok(parts);
            }
        }
    }

    fn close(&mut self) -> Result<(), String> {
        for &(domain, stream_id) in &[
            (DomainType::DICTIONARY, FIELD_STREAM),
            (DomainType::DICTIONARY, ENUM_STREAM),
            (DomainType::SOURCE, DIRECTORY_STREAM),
            (DomainType::LOGIN, LOGIN_STREAM),
        ] {
            self.send(&Msg::close(domain, stream_id))?;
        }

        self.consumer.close();
        Ok(())
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, String> {
    (host, port)
        .to_socket_addrs()
        .map_err(|err| err.to_string())?
        .next()
        .ok_or_else(|| format!("unable to resolve {}", host))
}

fn probe(host: &str, port: u16, user: &str, service_id: u16, log: &logging::Logger) -> Result<(), String> {
    let addr = resolve(host, port)?;
    let consumer = SimpleConsumer::connect(addr, 60, Duration::from_secs(30)).map_err(|err| err.to_string())?;

    logging::info!(log, "connected";
                   "addr" => %addr,
                   "ping_timeout" => consumer.info().ping_timeout,
                   "max_fragment_size" => consumer.info().max_fragment_size);

    let mut probe = Probe {
        consumer,
        codec: BinaryCodec,
        log: log.clone(),
    };

    probe.login(user)?;
    probe.directory()?;

    let mut dictionary = DataDictionary::new();
    let field_parts = probe.dictionary(DictionaryKind::Field, FIELD_STREAM, service_id, &mut dictionary)?;
    let enum_parts = probe.dictionary(DictionaryKind::EnumType, ENUM_STREAM, service_id, &mut dictionary)?;

    logging::info!(log, "dictionaries received";
                   "field_parts" => field_parts,
                   "enum_parts" => enum_parts,
                   "fields" => dictionary.field_count(),
                   "enum_tables" => dictionary.enum_tables().len(),
                   "version" => dictionary.field_tag("Version").unwrap_or("unknown"));

    probe.close()
}

fn main() {
    let matches = App::new("Probe Consumer")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Logs into a provider, requests the source directory and both dictionaries.")
        .arg(
            Arg::with_name("HOST")
                .short("a")
                .takes_value(true)
                .default_value("localhost")
                .help("Provider host"),
        )
        .arg(
            Arg::with_name("PORT")
                .short("p")
                .takes_value(true)
                .default_value("14002")
                .help("Provider port"),
        )
        .arg(
            Arg::with_name("USER")
                .short("u")
                .takes_value(true)
                .default_value("user1")
                .help("User name to log in with"),
        )
        .arg(
            Arg::with_name("SERVICE_ID")
                .short("s")
                .takes_value(true)
                .default_value("1")
                .help("Id of the service the dictionaries are requested from"),
        )
        .get_matches();

    let log = logging::terminal();

    let host = matches.value_of("HOST").unwrap_or("localhost");
    let user = matches.value_of("USER").unwrap_or("user1");
    let port = matches.value_of("PORT").and_then(|port| port.parse::<u16>().ok());
    let service_id = matches.value_of("SERVICE_ID").and_then(|id| id.parse::<u16>().ok());

    let result = match (port, service_id) {
        (Some(port), Some(service_id)) => probe(host, port, user, service_id, &log),
        _ => Err("port and service id must be numbers".to_string()),
    };

    if let Err(err) = result {
        logging::crit!(log, "probe failed"; "error" => err);
        drop(log);
        process::exit(flux::FAILURE);
    }
}
