#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            use super::*;

            use $crate::network::NetworkPackage;
            use $crate::{server, client};

            use $crate::tokio::sync::mpsc::{self, Sender, Receiver};
            use $crate::serde_json;
            use $crate::serde::{Serialize, Deserialize};
            use $crate::anyhow::{Result, anyhow};
            use $crate::async_trait;
            use $crate::log::{debug, trace};


            #[derive(Debug, Deserialize, Serialize)]
            pub enum Request {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name {  $($arg_id : $arg_ty),* }
                ),*
            }

            mod response {
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        pub data: $output
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&mut self, $($arg_id : $arg_ty),* ) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<NetworkPackage>,
            }

            impl Client {

                $(
                    pub async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output> {
                        let req = Request::$method_name {
                            $($arg_id),*
                        };
                        let resp = self.call(serde_json::to_string(&req)?).await?;
                        let resp: response::$method_name = $crate::serde_json::from_str(&resp)?;
                        Ok(resp.data)
                    }
                )*

                /// Name of the server this client talks to.
                pub fn server_id(&self) -> &str {
                    &self.server_id
                }

                pub async fn call(&self, req: String) -> Result<String> {
                    let (tx, mut rx) = mpsc::channel(1);
                    self.tx.send(NetworkPackage{to: self.server_id.clone(), reply: tx, data: req.clone()}).await?;
                    match $crate::tokio::time::timeout(client::CALL_TIMEOUT, rx.recv()).await {
                        Ok(Some(resp)) => {
                            trace!("req: {}, resp: {}", req, &resp);
                            Ok(resp)
                        }
                        Ok(None) => Err(anyhow!("unable to receive from server {}", self.server_id)),
                        Err(_) => Err(anyhow!("call to {} timed out", self.server_id)),
                    }
                }
            }

            impl client::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                    }
                }
            }

            #[derive(Debug)]
            pub struct Server<T: Service + Send> {
                svc: T,
                tx: Sender<NetworkPackage>,
                rx: Receiver<NetworkPackage>,
            }

            #[async_trait]
            impl<T: Service + Send> server::Server for Server<T> {
                type Service = T;

                fn from_service(svc: Self::Service) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self {svc, tx, rx}
                }

                fn client_chan(&self) -> Sender<NetworkPackage> {
                    self.tx.clone()
                }

                async fn recv(&mut self) -> Option<NetworkPackage> {
                    self.rx.recv().await
                }

                async fn handle(&mut self, package: NetworkPackage) -> Result<()> {
                    let NetworkPackage { to, reply, data } = package;
                    trace!("{} handle recv: {}", to, &data);
                    let req: Request = serde_json::from_str(&data)?;
                    match req {
                        $(
                            Request::$method_name { $($arg_id),* } => {
                                let data = match self.svc.$method_name($($arg_id),* ).await {
                                    Ok(data) => data,
                                    Err(e) => {
                                        debug!("{} {} failed: {}", to, stringify!($method_name), e);
                                        return Ok(());
                                    }
                                };
                                let resp = response::$method_name {
                                    data
                                };
                                let resp = serde_json::to_string(&resp)?;
                                trace!("{} handle send: {}", to, &resp);
                                if reply.send(resp).await.is_err() {
                                    trace!("{} reply dropped", to);
                                }
                                Ok(())
                            }
                        )*
                    }
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{server::Server as _, Network};

    crate::service! {
        service echo {
            fn say(a: i32, x: String) -> String;
            fn fail() -> ();
        }
    }

    struct Echo;

    #[crate::async_trait]
    impl echo::Service for Echo {
        async fn say(&mut self, a: i32, x: String) -> crate::anyhow::Result<String> {
            Ok(format!("{}:{}", a, x))
        }
        async fn fail(&mut self) -> crate::anyhow::Result<()> {
            Err(crate::anyhow::anyhow!("always fails"))
        }
    }

    #[tokio::test]
    async fn test_call_and_handler_error() {
        let mut net = Network::new();
        let client: echo::Client = net.client("echo");
        let routine = net.register_service::<echo::Server<Echo>>("echo", Echo);
        let server = tokio::spawn(routine);
        let router = tokio::spawn(async move { net.run().await });

        assert_eq!(client.say(1, "hi".to_string()).await.unwrap(), "1:hi");
        assert!(client.fail().await.is_err());
        // A failed handler does not stop the server.
        assert_eq!(client.say(2, "again".to_string()).await.unwrap(), "2:again");

        server.abort();
        router.abort();
    }

    #[tokio::test]
    async fn test_server_handles_package_directly() {
        let mut server = echo::Server::from_service(Echo);
        let tx = server.client_chan();
        let (reply, mut rx) = crate::tokio::sync::mpsc::channel(1);
        tx.send(crate::network::NetworkPackage {
            to: "echo".to_string(),
            reply,
            data: r#"{"say":{"a":7,"x":"x"}}"#.to_string(),
        })
        .await
        .unwrap();
        let package = server.recv().await.unwrap();
        server.handle(package).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"{"data":"7:x"}"#);
    }

    #[tokio::test]
    async fn test_only_malformed_requests_are_errors() {
        let mut server = echo::Server::from_service(Echo);
        let package = |data: &str| {
            let (reply, rx) = crate::tokio::sync::mpsc::channel(1);
            let package = crate::network::NetworkPackage {
                to: "echo".to_string(),
                reply,
                data: data.to_string(),
            };
            (package, rx)
        };

        // A failing handler drops the reply without failing the server.
        let (p, mut rx) = package(r#"{"fail":{}}"#);
        assert!(server.handle(p).await.is_ok());
        assert_eq!(rx.recv().await, None);

        // So does a caller that stopped waiting.
        let (p, rx) = package(r#"{"say":{"a":1,"x":"x"}}"#);
        drop(rx);
        assert!(server.handle(p).await.is_ok());

        let (p, _rx) = package("not json");
        assert!(server.handle(p).await.is_err());
    }
}
