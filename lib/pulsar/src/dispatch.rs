//! Routes decoded messages to the handler of their domain.
use crate::config::ProviderConfig;
use crate::dictionary::DataDictionary;
use crate::handler::{DictionaryHandler, DirectoryHandler, DomainHandler, ItemHandler, LoginHandler, Responder};
use crate::net::support::{ErrorType, NetworkError, NetworkResult};
use crate::rdm::{DomainType, Msg, MsgClass};
use flux::logging;
use hashbrown::HashMap;
use std::rc::Rc;

pub struct Dispatcher {
    handlers: Vec<Box<dyn DomainHandler>>,
    index: HashMap<DomainType, usize>,
    items: Option<Box<dyn ItemHandler>>,
    log: logging::Logger,
}

impl Dispatcher {
    pub fn new(log: logging::Logger) -> Dispatcher {
        Dispatcher {
            handlers: Vec::new(),
            index: HashMap::new(),
            items: None,
            log,
        }
    }

    /// Dispatcher serving login, directory and dictionary streams.
    pub fn provider(config: &ProviderConfig, dictionary: Rc<DataDictionary>, log: logging::Logger) -> Dispatcher {
        let service = &config.service;
        let mut dispatcher = Dispatcher::new(log);

        dispatcher.register(Box::new(LoginHandler::new(
            service.host_name.as_str(),
            service.application_id.as_str(),
            service.application_name.as_str(),
        )));
        dispatcher.register(Box::new(DirectoryHandler::new(service.clone())));
        dispatcher.register(Box::new(DictionaryHandler::new(dictionary, service.id)));

        dispatcher
    }

    /// Registers a handler, replacing any earlier handler of the same domain.
    pub fn register(&mut self, handler: Box<dyn DomainHandler>) {
        let domain = handler.domain();

        match self.index.get(&domain) {
            Some(&idx) => self.handlers[idx] = handler,
            None => {
                self.index.insert(domain, self.handlers.len());
                self.handlers.push(handler);
            }
        }
    }

    #[inline]
    pub fn set_item_handler(&mut self, handler: Box<dyn ItemHandler>) {
        self.items = Some(handler);
    }

    /// Handles a single message. Only transport failures and unexpected message classes on the
    /// administrative domains are returned as errors.
    pub fn dispatch(&mut self, responder: &mut Responder, msg: &Msg) -> NetworkResult<()> {
        if let Some(&idx) = self.index.get(&msg.domain) {
            let handler = &mut self.handlers[idx];

            return match msg.class {
                MsgClass::Request => handler.on_request(responder, msg),
                MsgClass::Close => handler.on_close(responder, msg.stream_id),
                class => {
                    logging::error!(self.log, "unexpected message class";
                                    "domain" => %msg.domain, "class" => ?class, "stream_id" => msg.stream_id);
                    Err(NetworkError::Fatal(ErrorType::UnexpectedMessage))
                }
            };
        }

        if msg.domain.is_item() {
            return match &mut self.items {
                Some(items) => items.on_message(responder, msg),
                None => {
                    logging::debug!(self.log, "item message ignored";
                                    "domain" => %msg.domain, "class" => ?msg.class, "stream_id" => msg.stream_id);
                    Ok(())
                }
            };
        }

        logging::warn!(self.log, "unknown domain"; "domain" => %msg.domain, "stream_id" => msg.stream_id);
        Ok(())
    }

    /// Announces the end of every open stream, last registered domain first. Stops at the first
    /// failed send.
    pub fn shutdown(&mut self, responder: &mut Responder) -> NetworkResult<()> {
        for handler in self.handlers.iter_mut().rev() {
            handler.on_shutdown(responder)?;
        }

        Ok(())
    }

    pub fn reset(&mut self) {
        for handler in self.handlers.iter_mut() {
            handler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::fixtures;
    use crate::handler::testing::with_responder;
    use crate::mock::MockTransport;
    use crate::rdm::{MsgKey, NAME_TYPE_USER_NAME};
    use std::cell::RefCell;

    fn dispatcher() -> Dispatcher {
        Dispatcher::provider(
            &ProviderConfig::default(),
            Rc::new(fixtures::dictionary()),
            logging::discard(),
        )
    }

    fn login(stream_id: i32) -> Msg {
        Msg::request(
            DomainType::LOGIN,
            stream_id,
            MsgKey::named("user1").with_name_type(NAME_TYPE_USER_NAME),
        )
    }

    struct CountingItems(Rc<RefCell<Vec<i32>>>);

    impl ItemHandler for CountingItems {
        fn on_message(&mut self, _responder: &mut Responder, msg: &Msg) -> NetworkResult<()> {
            self.0.borrow_mut().push(msg.stream_id);
            Ok(())
        }
    }

    #[test]
    fn test_routes_by_domain() {
        let mut transport = MockTransport::active();
        let mut dispatcher = dispatcher();

        let requests = vec![
            login(1),
            Msg::request(DomainType::SOURCE, 2, MsgKey::default().with_filter(0x07)),
            Msg::request(DomainType::DICTIONARY, 3, MsgKey::named("RWFEnum")),
        ];

        for msg in &requests {
            with_responder(&mut transport, |responder| dispatcher.dispatch(responder, msg)).unwrap();
        }

        let sent = transport.take_decoded();
        let routed: Vec<(DomainType, i32, MsgClass)> = sent.iter().map(|msg| (msg.domain, msg.stream_id, msg.class)).collect();

        assert_eq!(
            routed,
            vec![
                (DomainType::LOGIN, 1, MsgClass::Refresh),
                (DomainType::SOURCE, 2, MsgClass::Refresh),
                (DomainType::DICTIONARY, 3, MsgClass::Refresh),
            ]
        );
    }

    #[test]
    fn test_unexpected_class_is_fatal() {
        let mut transport = MockTransport::active();
        let mut dispatcher = dispatcher();

        let update = Msg::new(MsgClass::Update, DomainType::LOGIN, 1);

        assert_eq!(
            with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &update)),
            Err(NetworkError::Fatal(ErrorType::UnexpectedMessage))
        );
    }

    #[test]
    fn test_item_and_unknown_domains() {
        let mut transport = MockTransport::active();
        let mut dispatcher = dispatcher();

        let price = Msg::request(DomainType::MARKET_PRICE, 5, MsgKey::named("TRI.N"));
        let unknown = Msg::request(DomainType(200), 6, MsgKey::named("X"));

        // Nobody listens for items yet
        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &price)).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        dispatcher.set_item_handler(Box::new(CountingItems(seen.clone())));

        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &price)).unwrap();
        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &unknown)).unwrap();

        assert_eq!(*seen.borrow(), vec![5]);
        assert!(transport.written.is_empty());
    }

    #[test]
    fn test_close_then_reopen() {
        let mut transport = MockTransport::active();
        let mut dispatcher = dispatcher();

        let close = Msg::close(DomainType::LOGIN, 1);

        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &login(1))).unwrap();
        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &close)).unwrap();
        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &login(2))).unwrap();

        let sent = transport.take_decoded();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].stream_id, 2);
        assert_eq!(sent[1].class, MsgClass::Refresh);
    }

    #[test]
    fn test_shutdown_order() {
        let mut transport = MockTransport::active();
        let mut dispatcher = dispatcher();

        let field = Msg::request(DomainType::DICTIONARY, 3, MsgKey::named("RWFFld"));

        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &login(1))).unwrap();
        with_responder(&mut transport, |responder| dispatcher.dispatch(responder, &field)).unwrap();
        transport.written.clear();

        with_responder(&mut transport, |responder| dispatcher.shutdown(responder)).unwrap();

        let sent = transport.take_decoded();
        let texts: Vec<&str> = sent.iter().map(|msg| msg.state.as_ref().unwrap().text.as_str()).collect();

        assert_eq!(texts, vec!["Dictionary stream closed", "Login stream closed"]);
    }
}
