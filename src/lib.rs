/*!
# Data Extractor

A small web front end that lets an operator upload a spreadsheet, forwards it
to a remote processing endpoint and offers the transformed result as a table
preview and an Excel download.

## Flow

Each login session moves through four states:

- **Unauthenticated** - only the login form is reachable
- **AwaitingUpload** - the operator may download the sample file and upload a spreadsheet
- **Processing** - the upload is staged and submitted to the remote endpoint; a
  failed call keeps the session here with the error shown until a retry or a
  new upload
- **ResultReady** - the response is previewed and can be downloaded as XLSX;
  a reset returns to AwaitingUpload

## Modules

- **config**: Injected configuration (credentials, endpoint, staging directories)
- **session**: Session state and the in-memory session store
- **flow**: The state machine driving a session
- **staging**: Local scratch storage for uploads and results
- **remote**: The remote processing client
- **table**: Delimited-text responses as typed rows and columns
- **downloader**: XLSX export of a processed table
- **mailer**: Optional e-mail notification with the processed workbook
- **login**: Login/logout handlers and authentication middleware
- **app**: Routing, page rendering and the server entry point

## HTTP Endpoints

- `GET /login`, `POST /login`, `POST /logout`
- `GET /` - page for the current state
- `POST /upload` - multipart field `file`, uploads and processes in one pass
- `POST /process` - retry the remote call for the staged file
- `POST /reset` - clear the session's files and result
- `GET /download` - processed workbook
- `GET /sample` - reference spreadsheet
- `GET /api/session` - JSON view of the session
*/

pub mod app;
pub mod config;
pub mod downloader;
pub mod error;
pub mod flow;
pub mod login;
pub mod mailer;
pub mod remote;
pub mod session;
pub mod staging;
pub mod table;

pub use app::{AppState, SessionView, router, run};
pub use config::Config;
pub use error::{FlowError, RemoteError};
pub use flow::Workflow;
pub use remote::{HttpProcessor, Processor};
pub use session::{FlowState, Session};
pub use table::{CellValue, Table};
