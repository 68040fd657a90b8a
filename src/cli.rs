use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Visual product search and cross-platform price comparison", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build the catalog index and serve the HTTP API
    Serve {
        /// Address to listen on, overrides server.bind
        #[clap(long)]
        bind: Option<String>,
    },

    /// Search the catalog with a local image
    Image {
        /// Image file (png, jpeg, gif, webp, bmp)
        path: PathBuf,

        /// Number of matches, overrides search.top_k
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Look up a marketplace product link
    Link {
        /// Amazon, Flipkart, Meesho or Myntra product url
        url: String,
    },

    /// Build the catalog index and print each entry's status
    Catalog,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_command() {
        let args = Args::try_parse_from(["dealscout", "image", "shirt.jpg", "--top-k", "2"]).unwrap();
        match args.command {
            Command::Image { path, top_k } => {
                assert_eq!(path, PathBuf::from("shirt.jpg"));
                assert_eq!(top_k, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_serve_defaults() {
        let args = Args::try_parse_from(["dealscout", "serve"]).unwrap();
        assert!(matches!(args.command, Command::Serve { bind: None }));
    }

    #[test]
    fn test_link_requires_url() {
        assert!(Args::try_parse_from(["dealscout", "link"]).is_err());
    }
}
